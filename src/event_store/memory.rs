//! In-process event store, used by tests and `--local` tooling.

use super::EventStore;
use crate::domain::{AggregateKind, AggregateRecord, Event, StoreError};
use async_trait::async_trait;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    log: RwLock<Vec<Event>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events across all streams.
    pub async fn len(&self) -> usize {
        self.log.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.log.read().await.is_empty()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn load(&self, aggregate_id: &str) -> Result<Option<AggregateRecord>, StoreError> {
        let log = self.log.read().await;
        let stream = log
            .iter()
            .filter(|event| event.aggregate_id == aggregate_id)
            .cloned();
        Ok(AggregateRecord::replay(stream))
    }

    async fn save(&self, record: &mut AggregateRecord) -> Result<(), StoreError> {
        if record.pending().is_empty() {
            return Ok(());
        }

        let mut log = self.log.write().await;
        let aggregate_id = record.aggregate.id().to_string();
        let actual = log
            .iter()
            .filter(|event| event.aggregate_id == aggregate_id)
            .count() as u64;
        if actual != record.version {
            return Err(StoreError::Conflict {
                aggregate_id,
                expected: record.version,
                actual,
            });
        }

        log.extend(record.pending().iter().cloned());
        record.mark_committed();
        Ok(())
    }

    async fn load_events_by_type(&self, kind: AggregateKind) -> Result<Vec<Event>, StoreError> {
        let log = self.log.read().await;
        Ok(log
            .iter()
            .filter(|event| event.aggregate_type == kind)
            .cloned()
            .collect())
    }
}
