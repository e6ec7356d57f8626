//! Event-sourced lifecycle aggregates and a streaming orchestrator that turns
//! events into prioritized agent work.

pub mod agents;
pub mod app;
pub mod config;
pub mod domain;
pub mod event_store;
pub mod logging;
pub mod orchestration;
pub mod router;
pub mod stream;
pub mod structured_logger;

/// Short git SHA of the build, or `unknown`.
pub const BUILD_SHA: &str = env!("ORCHESTRATOR_GIT_SHA");
