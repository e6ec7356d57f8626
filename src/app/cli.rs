use crate::config::CliOverrides;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "orchestrator")]
#[command(about = "Routes lifecycle events into event-sourced aggregates and runs agent work")]
#[command(version)]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Base URL of the event API
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Project directory agents run in
    #[arg(long, global = true)]
    pub project_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Consume the event stream and run agent work (default)
    Run,
    /// Submit a single event
    Emit(EmitArgs),
    /// Print an aggregate from the local event store
    Inspect {
        aggregate_id: String,
    },
}

#[derive(Debug, Clone, Args)]
pub struct EmitArgs {
    /// Event name, e.g. `agent.coder.started`
    pub event_name: String,

    /// Attribute as key=value; values parse as JSON, otherwise as strings
    #[arg(long = "attr", value_name = "KEY=VALUE")]
    pub attributes: Vec<String>,

    #[arg(long)]
    pub aggregate_id: Option<String>,

    #[arg(long)]
    pub correlation_id: Option<String>,

    #[arg(long)]
    pub causation_id: Option<String>,

    /// Route into the local event store instead of the API
    #[arg(long)]
    pub local: bool,
}

impl Cli {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            api_url: self.api_url.clone(),
            project_root: self.project_root.clone(),
            verbosity: self.verbose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_no_subcommand() {
        let cli = Cli::try_parse_from(["orchestrator"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.verbose, 0);
        assert!(cli.overrides().api_url.is_none());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "orchestrator",
            "-vv",
            "--api-url",
            "http://api:1",
            "run",
            "--project-root",
            "/work",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Run)));
        let overrides = cli.overrides();
        assert_eq!(overrides.verbosity, 2);
        assert_eq!(overrides.api_url.as_deref(), Some("http://api:1"));
        assert_eq!(overrides.project_root, Some(PathBuf::from("/work")));
    }

    #[test]
    fn test_emit_args() {
        let cli = Cli::try_parse_from([
            "orchestrator",
            "emit",
            "system.session_started",
            "--attr",
            "command=/deploy",
            "--attr",
            "retries=3",
            "--local",
        ])
        .unwrap();
        let Some(Command::Emit(args)) = cli.command else {
            panic!("expected emit command");
        };
        assert_eq!(args.event_name, "system.session_started");
        assert_eq!(args.attributes, vec!["command=/deploy", "retries=3"]);
        assert!(args.local);
        assert!(args.aggregate_id.is_none());
    }

    #[test]
    fn test_inspect_requires_id() {
        assert!(Cli::try_parse_from(["orchestrator", "inspect"]).is_err());
        let cli = Cli::try_parse_from(["orchestrator", "inspect", "agent-1"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Inspect { aggregate_id }) if aggregate_id == "agent-1"
        ));
    }
}
