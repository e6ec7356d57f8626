use anyhow::Result;
use clap::Parser;
use event_orchestrator::app::{commands, Cli, Command, Orchestrator};
use event_orchestrator::config::OrchestratorConfig;
use event_orchestrator::{logging, BUILD_SHA};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = OrchestratorConfig::load(cli.config.as_deref(), &cli.overrides())?;
    logging::init(config.verbosity)?;
    tracing::debug!(build = BUILD_SHA, "orchestrator starting");

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let summary = Orchestrator::new(config).run().await?;
            tracing::info!(
                forwarded = summary.consumer.forwarded,
                enqueued = summary.forwarder.enqueued,
                succeeded = summary.scheduler.succeeded,
                failed = summary.scheduler.failed,
                "Run finished"
            );
        }
        Command::Emit(args) => {
            let result = commands::emit(&config, &args).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Inspect { aggregate_id } => {
            let aggregate = commands::inspect(&config, &aggregate_id).await?;
            println!("{}", serde_json::to_string_pretty(&aggregate)?);
        }
    }

    Ok(())
}
