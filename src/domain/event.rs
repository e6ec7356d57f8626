//! Domain events and inbound event submissions.
//!
//! An [`Event`] is an immutable fact. Its `event_name` decides which aggregate
//! family it belongs to and which apply rule fires. An [`EventRequest`] is the
//! submission shape accepted by the router and the event API before an id,
//! timestamp and target aggregate have been assigned.

use crate::domain::types::{AggregateKind, Attributes, TimestampUtc};
use cqrs_es::DomainEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// An immutable event recorded against exactly one aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Uuid,
    pub aggregate_id: String,
    pub aggregate_type: AggregateKind,
    pub event_name: String,
    #[serde(default)]
    pub attributes: Attributes,
    pub timestamp: TimestampUtc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Event {
    /// Action segment of the event name for its aggregate family.
    pub fn action(&self) -> &str {
        self.aggregate_type.action(&self.event_name)
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

impl DomainEvent for Event {
    fn event_type(&self) -> String {
        self.event_name.clone()
    }

    fn event_version(&self) -> String {
        "1".to_string()
    }
}

/// An event submission: `{event_name, attributes, aggregate_id?, correlation_id?, causation_id?}`.
///
/// `event_id` and `timestamp` are never sent on the wire; they let a projection
/// of an already-stored event keep its original identity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRequest {
    pub event_name: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
    #[serde(skip)]
    pub event_id: Option<Uuid>,
    #[serde(skip)]
    pub timestamp: Option<TimestampUtc>,
}

impl EventRequest {
    pub fn new(event_name: impl Into<String>) -> Self {
        Self {
            event_name: event_name.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn with_aggregate_id(mut self, aggregate_id: impl Into<String>) -> Self {
        self.aggregate_id = Some(aggregate_id.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_causation_id(mut self, causation_id: impl Into<String>) -> Self {
        self.causation_id = Some(causation_id.into());
        self
    }

    /// Keeps the identity of an event that was already stored elsewhere.
    pub fn with_identity(mut self, event_id: Uuid, timestamp: TimestampUtc) -> Self {
        self.event_id = Some(event_id);
        self.timestamp = Some(timestamp);
        self
    }
}

/// The only command accepted by the aggregates: record an already-built event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEvent {
    pub event: Event,
}

impl RecordEvent {
    pub fn new(event: Event) -> Self {
        Self { event }
    }
}
