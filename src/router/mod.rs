//! Aggregate router.
//!
//! Classifies an inbound event by its name prefix, resolves the target
//! aggregate id, loads or creates the aggregate, applies the event and
//! persists it. Every successful route performs exactly one store write.

pub mod actor;

pub use actor::{RouterActor, RouterHandle, RouterMessage};

use crate::domain::types::{attr_scalar, non_empty};
use crate::domain::{
    AggregateKind, AggregateRecord, AnyAggregate, Clock, Event, EventRequest, RouteError,
    StoreError,
};
use crate::event_store::EventStore;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Session id used for system events that carry none.
pub const DEFAULT_SESSION_ID: &str = "default_session";

#[derive(Clone)]
pub struct AggregateRouter {
    store: Arc<dyn EventStore>,
    clock: Clock,
}

impl AggregateRouter {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            clock: Clock::default(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Routes one event to its aggregate and persists it.
    ///
    /// Returns the aggregate state after the event and the recorded event.
    pub async fn route(&self, request: EventRequest) -> Result<(AnyAggregate, Event), RouteError> {
        let kind = AggregateKind::from_event_name(&request.event_name)
            .ok_or_else(|| RouteError::InvalidEventName(request.event_name.clone()))?;
        let aggregate_id = resolve_aggregate_id(kind, &request)?;

        let event = Event {
            event_id: request.event_id.unwrap_or_else(Uuid::new_v4),
            aggregate_id: aggregate_id.clone(),
            aggregate_type: kind,
            event_name: request.event_name,
            attributes: request.attributes,
            timestamp: request.timestamp.unwrap_or_else(|| self.clock.now()),
            causation_id: request.causation_id.filter(|s| !s.is_empty()),
            correlation_id: request.correlation_id.filter(|s| !s.is_empty()),
        };

        let mut record = self.load_or_create(kind, &aggregate_id).await;
        for recorded in record.aggregate.handle(event.clone()).await? {
            record.record(recorded);
        }
        self.store.save(&mut record).await?;

        debug!(
            aggregate_id = %aggregate_id,
            event_name = %event.event_name,
            version = record.version,
            status = record.aggregate.status(),
            "routed event"
        );

        Ok((record.aggregate, event))
    }

    /// Current state of an aggregate, if it has any events.
    pub async fn load(&self, aggregate_id: &str) -> Result<Option<AnyAggregate>, StoreError> {
        Ok(self
            .store
            .load(aggregate_id)
            .await?
            .map(|record| record.aggregate))
    }

    /// Loads the aggregate, recreating it when the stored kind differs or the
    /// load fails.
    ///
    /// A recreated aggregate keeps the stream version so the following save
    /// appends to the same stream.
    async fn load_or_create(&self, kind: AggregateKind, aggregate_id: &str) -> AggregateRecord {
        match self.store.load(aggregate_id).await {
            Ok(Some(record)) if record.aggregate.kind() == kind => record,
            Ok(Some(record)) => {
                warn!(
                    aggregate_id,
                    found = %record.aggregate.kind(),
                    expected = %kind,
                    version = record.version,
                    "aggregate load conflict, recreating aggregate"
                );
                AggregateRecord::new(AnyAggregate::new(kind, aggregate_id), record.version)
            }
            Ok(None) => AggregateRecord::new(AnyAggregate::new(kind, aggregate_id), 0),
            Err(err) => {
                warn!(
                    aggregate_id,
                    error = %err,
                    "failed to load aggregate, recreating aggregate"
                );
                AggregateRecord::new(AnyAggregate::new(kind, aggregate_id), 0)
            }
        }
    }
}

/// Target aggregate id for a request of the given kind.
///
/// - agent: the caller-supplied aggregate id
/// - workflow: the correlation id
/// - system: `system_<session_id>`, defaulting to `system_default_session`
pub fn resolve_aggregate_id(kind: AggregateKind, request: &EventRequest) -> Result<String, RouteError> {
    match kind {
        AggregateKind::Agent => non_empty(request.aggregate_id.as_deref())
            .map(str::to_string)
            .ok_or_else(|| RouteError::MissingAggregateId(request.event_name.clone())),
        AggregateKind::Workflow => non_empty(request.correlation_id.as_deref())
            .map(str::to_string)
            .ok_or_else(|| RouteError::MissingCorrelationId(request.event_name.clone())),
        AggregateKind::System => {
            let session_id = attr_scalar(&request.attributes, "session_id")
                .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string());
            Ok(format!("system_{}", session_id))
        }
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
