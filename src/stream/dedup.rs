//! Processed-event tracking and strategy hook points.

use super::StreamedEvent;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;

/// Bounded set of event ids already forwarded.
///
/// Holds the most recent `capacity` distinct ids; older ids are evicted, so a
/// redelivery older than the horizon is forwarded again.
pub struct ProcessedEvents {
    ids: LruCache<String, ()>,
}

impl ProcessedEvents {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            ids: LruCache::new(capacity),
        }
    }

    /// Returns true when `event_id` was already processed, refreshing its
    /// recency.
    pub fn contains(&mut self, event_id: &str) -> bool {
        self.ids.get(event_id).is_some()
    }

    pub fn insert(&mut self, event_id: &str) {
        self.ids.put(event_id.to_string(), ());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ids.cap().get()
    }
}

/// Content-based duplicate detection hook.
pub trait ContentDeduplicator: Send + Sync {
    fn content_hash(&self, event: &StreamedEvent) -> String;

    fn is_duplicate(&mut self, event: &StreamedEvent) -> bool;
}

/// Hashes event content but never reports a duplicate.
#[derive(Debug, Default)]
pub struct NoopContentDeduplicator;

impl ContentDeduplicator for NoopContentDeduplicator {
    fn content_hash(&self, event: &StreamedEvent) -> String {
        let content = serde_json::json!({
            "event_name": event.event_name(),
            "attributes": event.attributes(),
        });
        let digest = Sha256::digest(content.to_string().as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    fn is_duplicate(&mut self, _event: &StreamedEvent) -> bool {
        false
    }
}

/// Event batching hook.
pub trait EventBatcher: Send + Sync {
    fn batch_key(&self, event: &StreamedEvent) -> String;

    /// Adds an event and returns the events ready for processing.
    fn add(&mut self, event: StreamedEvent) -> Vec<StreamedEvent>;

    /// Releases any events still held.
    fn flush(&mut self) -> Vec<StreamedEvent>;
}

/// Every event is its own batch.
#[derive(Debug, Default)]
pub struct NoopBatcher;

impl EventBatcher for NoopBatcher {
    fn batch_key(&self, event: &StreamedEvent) -> String {
        format!("batch_{}", event.event_name())
    }

    fn add(&mut self, event: StreamedEvent) -> Vec<StreamedEvent> {
        vec![event]
    }

    fn flush(&mut self) -> Vec<StreamedEvent> {
        Vec::new()
    }
}

#[cfg(test)]
#[path = "tests/dedup_tests.rs"]
mod tests;
