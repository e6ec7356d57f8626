//! Application layer: command line, task wiring and shutdown.

pub mod cli;
pub mod commands;
pub mod orchestrator;
pub mod shutdown;

pub use cli::{Cli, Command, EmitArgs};
pub use orchestrator::{EventForwarder, ForwarderStats, Orchestrator, RunSummary};
