use super::*;
use serde_json::json;

fn capacity(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn event(name: &str, attributes: serde_json::Value) -> StreamedEvent {
    StreamedEvent::new(json!({"event_name": name, "attributes": attributes}))
}

#[test]
fn test_processed_events_insert_and_contains() {
    let mut processed = ProcessedEvents::new(capacity(4));
    assert!(processed.is_empty());
    assert!(!processed.contains("e1"));

    processed.insert("e1");
    assert!(processed.contains("e1"));
    assert_eq!(processed.len(), 1);
    assert_eq!(processed.capacity(), 4);
}

#[test]
fn test_processed_events_evict_least_recent() {
    let mut processed = ProcessedEvents::new(capacity(2));
    processed.insert("e1");
    processed.insert("e2");

    // Touching e1 makes e2 the eviction candidate.
    assert!(processed.contains("e1"));
    processed.insert("e3");

    assert!(processed.contains("e1"));
    assert!(!processed.contains("e2"));
    assert!(processed.contains("e3"));
    assert_eq!(processed.len(), 2);
}

#[test]
fn test_noop_content_dedup_hashes_but_never_rejects() {
    let mut dedup = NoopContentDeduplicator;
    let a = event("system.error", json!({"code": 1}));
    let b = event("system.error", json!({"code": 1}));
    let c = event("system.error", json!({"code": 2}));

    assert_eq!(dedup.content_hash(&a), dedup.content_hash(&b));
    assert_ne!(dedup.content_hash(&a), dedup.content_hash(&c));
    assert_eq!(dedup.content_hash(&a).len(), 64);
    assert!(!dedup.is_duplicate(&a));
    assert!(!dedup.is_duplicate(&b));
}

#[test]
fn test_noop_batcher_passes_events_through() {
    let mut batcher = NoopBatcher;
    let e = event("agent.x.started", json!({}));

    assert_eq!(batcher.batch_key(&e), "batch_agent.x.started");
    assert_eq!(batcher.add(e.clone()), vec![e]);
    assert!(batcher.flush().is_empty());
}
