//! Reconnecting stream consumer.
//!
//! State machine:
//! `Disconnected -> Connecting -> Streaming -> (error or end) Backoff -> Connecting`.
//!
//! New `event_created` items are forwarded to the dispatcher channel and then
//! recorded in the processed set, so a redelivered id is skipped.

use super::dedup::{ContentDeduplicator, EventBatcher, NoopBatcher, NoopContentDeduplicator};
use super::{EventSource, ItemStream, ProcessedEvents, StreamError, StreamItem, StreamedEvent};
use crate::structured_logger::StructuredLogger;
use futures::StreamExt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Highest backoff exponent; the delay is capped well before this.
const MAX_BACKOFF_ATTEMPT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Streaming,
    Backoff,
}

/// Exponential reconnect policy with a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failed connections before the breaker opens.
    pub circuit_breaker_threshold: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
            circuit_breaker_threshold: 10,
        }
    }
}

impl ReconnectPolicy {
    /// `base * 2^attempt`, capped at `max_delay`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(MAX_BACKOFF_ATTEMPT));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Counters reported when the consumer stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub connections: u64,
    pub forwarded: u64,
    pub duplicates: u64,
    pub failures: u64,
}

enum SessionEnd {
    Closed,
    Failed(StreamError),
    Shutdown,
    DispatcherClosed,
}

pub struct StreamConsumer {
    source: Arc<dyn EventSource>,
    policy: ReconnectPolicy,
    processed: ProcessedEvents,
    content_dedup: Box<dyn ContentDeduplicator>,
    batcher: Box<dyn EventBatcher>,
    audit: Option<Arc<StructuredLogger>>,
    state_tx: watch::Sender<ConsumerState>,
    stats: ConsumerStats,
}

impl StreamConsumer {
    pub fn new(source: Arc<dyn EventSource>, dedup_capacity: NonZeroUsize) -> Self {
        let (state_tx, _) = watch::channel(ConsumerState::Disconnected);
        Self {
            source,
            policy: ReconnectPolicy::default(),
            processed: ProcessedEvents::new(dedup_capacity),
            content_dedup: Box::new(NoopContentDeduplicator),
            batcher: Box::new(NoopBatcher),
            audit: None,
            state_tx,
            stats: ConsumerStats::default(),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_audit_log(mut self, audit: Arc<StructuredLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_content_deduplicator(mut self, dedup: Box<dyn ContentDeduplicator>) -> Self {
        self.content_dedup = dedup;
        self
    }

    pub fn with_batcher(mut self, batcher: Box<dyn EventBatcher>) -> Self {
        self.batcher = batcher;
        self
    }

    /// Observes state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConsumerState> {
        self.state_tx.subscribe()
    }

    /// Consumes the feed until shutdown is signalled or the dispatcher side
    /// of `forward` is dropped.
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
        forward: mpsc::UnboundedSender<StreamedEvent>,
    ) -> ConsumerStats {
        let mut attempt = 0u32;
        let mut consecutive_failures = 0u32;
        let mut breaker_open = false;

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(ConsumerState::Connecting);
            let connected = tokio::select! {
                result = self.source.connect() => result,
                _ = shutdown.changed() => break,
            };

            let (received, end) = match connected {
                Ok(stream) => {
                    self.stats.connections += 1;
                    self.set_state(ConsumerState::Streaming);
                    self.consume(stream, &mut shutdown, &forward).await
                }
                Err(e) => (false, SessionEnd::Failed(e)),
            };

            match end {
                SessionEnd::Shutdown => break,
                SessionEnd::DispatcherClosed => {
                    tracing::info!("Dispatcher channel closed, stopping stream consumer");
                    break;
                }
                SessionEnd::Closed => tracing::info!("Event stream closed by server"),
                SessionEnd::Failed(e) => {
                    self.stats.failures += 1;
                    tracing::warn!(error = %e, "Event stream connection failed");
                }
            }

            if received {
                attempt = 0;
                consecutive_failures = 0;
                if breaker_open {
                    breaker_open = false;
                    tracing::info!("Event stream recovered, circuit breaker closed");
                }
            } else {
                consecutive_failures = consecutive_failures.saturating_add(1);
                if !breaker_open && consecutive_failures >= self.policy.circuit_breaker_threshold {
                    breaker_open = true;
                    tracing::error!(
                        failures = consecutive_failures,
                        "Event stream unavailable, circuit breaker open"
                    );
                }
            }

            self.set_state(ConsumerState::Backoff);
            let delay = self.policy.delay(attempt);
            attempt = attempt.saturating_add(1).min(MAX_BACKOFF_ATTEMPT);
            tracing::debug!("Reconnecting to event stream in {:?}", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        for event in self.batcher.flush() {
            let _ = forward.send(event);
        }
        self.set_state(ConsumerState::Disconnected);
        self.stats
    }

    /// Reads one connection. Returns whether any item arrived and why the
    /// connection ended.
    async fn consume(
        &mut self,
        mut stream: ItemStream,
        shutdown: &mut watch::Receiver<bool>,
        forward: &mpsc::UnboundedSender<StreamedEvent>,
    ) -> (bool, SessionEnd) {
        let mut received = false;
        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = shutdown.changed() => return (received, SessionEnd::Shutdown),
            };
            let item = match next {
                None => return (received, SessionEnd::Closed),
                Some(Err(e)) => return (received, SessionEnd::Failed(e)),
                Some(Ok(item)) => item,
            };
            received = true;

            if !self.handle_item(item, forward) {
                return (received, SessionEnd::DispatcherClosed);
            }
        }
    }

    /// Returns false once the dispatcher channel is closed.
    fn handle_item(
        &mut self,
        item: StreamItem,
        forward: &mpsc::UnboundedSender<StreamedEvent>,
    ) -> bool {
        match item {
            StreamItem::Heartbeat => {
                tracing::trace!("Event stream heartbeat");
                true
            }
            StreamItem::Error(payload) => {
                tracing::warn!(error = %payload, "Event stream reported an error");
                true
            }
            StreamItem::Unknown(kind) => {
                tracing::debug!(kind = %kind, "Ignoring unknown stream item");
                true
            }
            StreamItem::EventCreated(event) => self.accept(event, forward),
        }
    }

    fn accept(
        &mut self,
        event: StreamedEvent,
        forward: &mpsc::UnboundedSender<StreamedEvent>,
    ) -> bool {
        if let Some(event_id) = event.event_id() {
            if self.processed.contains(event_id) {
                self.stats.duplicates += 1;
                tracing::debug!(event_id = %event_id, "Skipping already processed event");
                if let Some(audit) = &self.audit {
                    audit.log_duplicate_skipped(event_id);
                }
                return true;
            }
        }
        if self.content_dedup.is_duplicate(&event) {
            tracing::debug!(event_name = %event.event_name(), "Skipping duplicate content");
            return true;
        }

        for ready in self.batcher.add(event) {
            let event_id = ready.event_id().map(str::to_string);
            tracing::info!(
                event_id = ?event_id,
                event_name = %ready.event_name(),
                "Received event"
            );
            if let Some(audit) = &self.audit {
                audit.log_event_accepted(event_id.as_deref(), ready.event_name());
            }
            if forward.send(ready).is_err() {
                return false;
            }
            self.stats.forwarded += 1;
            if let Some(event_id) = event_id {
                self.processed.insert(&event_id);
            }
        }
        true
    }

    fn set_state(&self, state: ConsumerState) {
        self.state_tx.send_replace(state);
    }
}

#[cfg(test)]
#[path = "tests/consumer_tests.rs"]
mod tests;
