//! Event-sourced domain model.
//!
//! Three aggregate families (agent, workflow, system) are projections of their
//! ordered event streams. State only changes through `apply`, which dispatches
//! on the event's action with one default arm per family:
//!
//! - **Events** (`event.rs`): immutable facts and inbound submissions
//! - **Aggregates** (`agent.rs`, `workflow.rs`, `system.rs`): apply rules
//! - **Records** (`aggregate.rs`): versioned aggregate plus replay

pub mod agent;
pub mod aggregate;
pub mod errors;
pub mod event;
pub mod services;
pub mod system;
pub mod types;
pub mod workflow;

pub use agent::AgentAggregate;
pub use aggregate::{AggregateRecord, AnyAggregate};
pub use errors::{DomainError, RouteError, StoreError};
pub use event::{Event, EventRequest, RecordEvent};
pub use services::Clock;
pub use system::SystemAggregate;
pub use types::{AggregateKind, Attributes, LifecycleStatus, SessionStatus, TimestampUtc};
pub use workflow::WorkflowAggregate;
