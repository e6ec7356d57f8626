//! Claude CLI invocation.
//!
//! Agents run non-interactively with `--print`, with the project root added
//! as an accessible directory and used as the working directory.

use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub const DEFAULT_CLAUDE_BINARY: &str = "claude";

const EVENT_CONTEXT_START: &str = "===EVENT_CONTEXT===";
const EVENT_CONTEXT_END: &str = "===END_CONTEXT===";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaudeInvocation {
    binary: PathBuf,
    project_root: PathBuf,
    skip_permissions: bool,
}

impl ClaudeInvocation {
    pub fn new(binary: PathBuf, project_root: PathBuf) -> Self {
        Self {
            binary,
            project_root,
            skip_permissions: true,
        }
    }

    pub fn with_skip_permissions(mut self, skip: bool) -> Self {
        self.skip_permissions = skip;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Arguments passed to the binary for `prompt`.
    pub fn args(&self, prompt: &str) -> Vec<String> {
        let mut args = vec![
            "--add-dir".to_string(),
            self.project_root.display().to_string(),
        ];
        if self.skip_permissions {
            args.push("--dangerously-skip-permissions".to_string());
        }
        args.push("--print".to_string());
        args.push(prompt.to_string());
        args
    }

    pub fn command(&self, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.args(prompt));
        cmd.current_dir(&self.project_root);
        cmd
    }
}

/// Resolves `name` on `PATH`, falling back to the name itself so the spawn
/// error names the missing binary.
pub fn resolve_binary(name: &str) -> PathBuf {
    which::which(name).unwrap_or_else(|_| PathBuf::from(name))
}

/// Prompt for a workflow initiator: the command followed by `suffix`.
pub fn initiator_prompt(command: &str, suffix: &str) -> String {
    format!("{}{}", command, suffix)
}

/// Prompt for an event-handler agent, embedding the event as pretty JSON.
pub fn handler_prompt(handler_name: &str, event: &Value) -> String {
    let context = serde_json::to_string_pretty(event).unwrap_or_else(|_| event.to_string());
    format!(
        "Execute the {} agent for the following event:\n{}\n{}\n{}",
        handler_name, EVENT_CONTEXT_START, context, EVENT_CONTEXT_END
    )
}

#[cfg(test)]
#[path = "tests/claude_tests.rs"]
mod tests;
