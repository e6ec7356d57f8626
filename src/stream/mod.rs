//! Event stream consumption.
//!
//! The event API exposes an infinite sequence of tagged items
//! (`event_created`, `heartbeat`, `error`). This module provides:
//! - **Sources** (`client.rs`): SSE and polling feeds over HTTP
//! - **Framing** (`sse.rs`): Server-Sent Events parsing
//! - **Consumer** (`consumer.rs`): reconnecting, deduplicating reader
//! - **Dedup** (`dedup.rs`): processed-event set plus no-op strategy hooks

pub mod client;
pub mod consumer;
pub mod dedup;
pub mod sse;

pub use client::{EventApiClient, PollingSource, SseSource};
pub use consumer::{ConsumerState, ConsumerStats, ReconnectPolicy, StreamConsumer};
pub use dedup::{
    ContentDeduplicator, EventBatcher, NoopBatcher, NoopContentDeduplicator, ProcessedEvents,
};

use crate::domain::types::{attr_scalar, Attributes, TimestampUtc};
use crate::domain::EventRequest;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Transient feed failures; each one ends the current connection.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to connect to event stream: {0}")]
    Connect(String),
    #[error("event API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to read event stream: {0}")]
    Read(String),
    #[error("failed to decode event stream payload: {0}")]
    Decode(String),
}

/// An event as delivered by the feed, kept as raw JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamedEvent {
    payload: Value,
}

impl StreamedEvent {
    pub fn new(payload: Value) -> Self {
        Self { payload }
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// `event_id` of the payload; `None` when absent or empty.
    pub fn event_id(&self) -> Option<&str> {
        self.str_field("event_id")
    }

    pub fn event_name(&self) -> &str {
        self.str_field("event_name").unwrap_or_default()
    }

    pub fn attributes(&self) -> Attributes {
        match self.payload.get("attributes") {
            Some(Value::Object(map)) => map.clone(),
            _ => Attributes::new(),
        }
    }

    /// A scalar attribute rendered as a string; empty strings count as absent.
    pub fn attribute_str(&self, key: &str) -> Option<String> {
        attr_scalar(&self.attributes(), key)
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.str_field("timestamp")
    }

    /// Submission that re-records this event locally under its original
    /// identity where the id and timestamp parse.
    pub fn to_request(&self) -> EventRequest {
        let mut request = EventRequest::new(self.event_name()).with_attributes(self.attributes());
        request.aggregate_id = self.str_field("aggregate_id").map(str::to_string);
        request.correlation_id = self.str_field("correlation_id").map(str::to_string);
        request.causation_id = self.str_field("causation_id").map(str::to_string);
        request.event_id = self.event_id().and_then(|id| Uuid::parse_str(id).ok());
        request.timestamp = self
            .timestamp()
            .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| TimestampUtc(ts.with_timezone(&chrono::Utc)));
        request
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.payload
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// One item of the event feed.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    EventCreated(StreamedEvent),
    /// Liveness signal only.
    Heartbeat,
    /// Non-fatal error reported by the feed.
    Error(Value),
    /// Item kind this consumer does not understand.
    Unknown(String),
}

impl StreamItem {
    pub fn kind(&self) -> &str {
        match self {
            Self::EventCreated(_) => "event_created",
            Self::Heartbeat => "heartbeat",
            Self::Error(_) => "error",
            Self::Unknown(kind) => kind,
        }
    }
}

pub type ItemStream = BoxStream<'static, Result<StreamItem, StreamError>>;

/// A connectable event feed.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Opens a new connection; the returned stream ends or errors when the
    /// connection is lost.
    async fn connect(&self) -> Result<ItemStream, StreamError>;
}

#[cfg(test)]
#[path = "tests/stream_item_tests.rs"]
mod tests;
