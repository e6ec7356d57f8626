//! Event store collaborator.
//!
//! Durable append-only storage keyed by aggregate id. Each aggregate id owns an
//! ordered stream; an aggregate is rebuilt by replaying that stream. Saves are
//! guarded by an optimistic version check.

pub mod file_store;
pub mod memory;

pub use file_store::{FileEventStore, StoredEvent};
pub use memory::InMemoryEventStore;

use crate::domain::{AggregateKind, AggregateRecord, Event, StoreError};
use async_trait::async_trait;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Replays the stream of `aggregate_id`; `None` when it has no events.
    async fn load(&self, aggregate_id: &str) -> Result<Option<AggregateRecord>, StoreError>;

    /// Appends the record's pending events.
    ///
    /// Fails with [`StoreError::Conflict`] when the stored stream length no
    /// longer equals `record.version`. On success the record is committed.
    async fn save(&self, record: &mut AggregateRecord) -> Result<(), StoreError>;

    /// All stored events of one aggregate family, in append order.
    async fn load_events_by_type(&self, kind: AggregateKind) -> Result<Vec<Event>, StoreError>;
}
