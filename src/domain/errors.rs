//! Error types for the event domain, the event store and the router.

use crate::domain::types::AggregateKind;
use thiserror::Error;

/// Rejections raised by an aggregate's command handler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    /// The event belongs to another aggregate family.
    #[error("{found} event cannot be recorded on a {expected} aggregate")]
    WrongAggregateKind {
        expected: AggregateKind,
        found: AggregateKind,
    },
    /// The event targets a different aggregate instance.
    #[error("event for aggregate '{found}' cannot be recorded on aggregate '{expected}'")]
    AggregateIdMismatch { expected: String, found: String },
}

/// Failures of the event store collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("event log entry is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Optimistic concurrency check failed.
    #[error(
        "aggregate '{aggregate_id}' was modified concurrently (expected version {expected}, found {actual})"
    )]
    Conflict {
        aggregate_id: String,
        expected: u64,
        actual: u64,
    },
}

/// Errors surfaced by [`crate::router::AggregateRouter::route`].
#[derive(Debug, Error)]
pub enum RouteError {
    /// The event name has no `agent.`/`workflow.`/`system.` prefix.
    #[error("invalid event name '{0}': expected an agent., workflow. or system. prefix")]
    InvalidEventName(String),
    /// Agent events need a caller-supplied aggregate id.
    #[error("event '{0}' requires an aggregate_id")]
    MissingAggregateId(String),
    /// Workflow events are keyed by the correlation id.
    #[error("event '{0}' requires a correlation_id")]
    MissingCorrelationId(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("failed to persist event: {0}")]
    Store(#[from] StoreError),
    /// The router actor is gone (shutdown or crash).
    #[error("aggregate router unavailable: {0}")]
    RouterUnavailable(String),
}
