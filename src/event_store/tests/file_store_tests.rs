use super::*;
use crate::domain::{AnyAggregate, Attributes, EventRequest};
use crate::event_store::InMemoryEventStore;
use serde_json::json;
use tempfile::tempdir;
use uuid::Uuid;

fn build_store_for_test() -> (tempfile::TempDir, FileEventStore) {
    let dir = tempdir().expect("temp dir");
    let store = FileEventStore::new(dir.path().join("nested").join("events.jsonl"));
    (dir, store)
}

fn event(kind: AggregateKind, aggregate_id: &str, name: &str, attributes: Attributes) -> Event {
    Event {
        event_id: Uuid::new_v4(),
        aggregate_id: aggregate_id.to_string(),
        aggregate_type: kind,
        event_name: name.to_string(),
        attributes,
        timestamp: TimestampUtc::now(),
        causation_id: None,
        correlation_id: None,
    }
}

fn record_with(kind: AggregateKind, id: &str, version: u64, names: &[&str]) -> AggregateRecord {
    let mut record = AggregateRecord::new(AnyAggregate::new(kind, id), version);
    for name in names {
        record.record(event(kind, id, name, Attributes::new()));
    }
    record
}

#[tokio::test]
async fn test_load_missing_log_returns_none() {
    let (_dir, store) = build_store_for_test();
    assert!(store.load("anything").await.unwrap().is_none());
    assert!(store
        .load_events_by_type(AggregateKind::Agent)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_save_then_load_replays_stream() {
    let (_dir, store) = build_store_for_test();
    let mut record = record_with(
        AggregateKind::Agent,
        "agent-1",
        0,
        &["agent.planner.started", "agent.planner.step"],
    );

    store.save(&mut record).await.unwrap();
    assert_eq!(record.version, 2);
    assert!(record.pending().is_empty());

    let loaded = store.load("agent-1").await.unwrap().unwrap();
    assert_eq!(loaded.version, 2);
    assert_eq!(loaded.aggregate.status(), "running");
}

#[tokio::test]
async fn test_sequences_are_per_aggregate() {
    let (_dir, store) = build_store_for_test();
    let mut a = record_with(AggregateKind::Agent, "a", 0, &["agent.x.started"]);
    let mut b = record_with(AggregateKind::Workflow, "b", 0, &["workflow.started"]);
    store.save(&mut a).await.unwrap();
    store.save(&mut b).await.unwrap();

    let content = std::fs::read_to_string(&store.log_path).unwrap();
    let sequences: Vec<(String, u64)> = content
        .lines()
        .map(|line| serde_json::from_str::<StoredEvent>(line).unwrap())
        .map(|stored| (stored.aggregate_id, stored.sequence))
        .collect();
    assert_eq!(
        sequences,
        vec![("a".to_string(), 1), ("b".to_string(), 1)]
    );
}

#[tokio::test]
async fn test_stale_version_is_a_conflict() {
    let (_dir, store) = build_store_for_test();
    let mut first = record_with(AggregateKind::Agent, "agent-1", 0, &["agent.x.started"]);
    store.save(&mut first).await.unwrap();

    let mut stale = record_with(AggregateKind::Agent, "agent-1", 0, &["agent.x.completed"]);
    let err = store.save(&mut stale).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Conflict {
            expected: 0,
            actual: 1,
            ..
        }
    ));
    assert_eq!(stale.pending().len(), 1);
}

#[tokio::test]
async fn test_load_events_by_type_filters_kind() {
    let (_dir, store) = build_store_for_test();
    let mut agent = record_with(AggregateKind::Agent, "a", 0, &["agent.x.started"]);
    let mut system = record_with(
        AggregateKind::System,
        "system_s1",
        0,
        &["system.session_started", "system.session_ended"],
    );
    store.save(&mut agent).await.unwrap();
    store.save(&mut system).await.unwrap();

    let events = store
        .load_events_by_type(AggregateKind::System)
        .await
        .unwrap();
    let names: Vec<&str> = events.iter().map(|e| e.event_name.as_str()).collect();
    assert_eq!(names, vec!["system.session_started", "system.session_ended"]);
}

#[tokio::test]
async fn test_corrupt_line_is_skipped() {
    let (_dir, store) = build_store_for_test();
    let mut record = record_with(AggregateKind::Agent, "a", 0, &["agent.x.started"]);
    store.save(&mut record).await.unwrap();

    let mut file = OpenOptions::new()
        .append(true)
        .open(&store.log_path)
        .unwrap();
    writeln!(file, "not json at all").unwrap();
    file.write_all(&[0xff, 0xfe, b'\n']).unwrap();

    let mut record = store.load("a").await.unwrap().unwrap();
    assert_eq!(record.version, 1);

    record.record(event(AggregateKind::Agent, "a", "agent.x.completed", Attributes::new()));
    store.save(&mut record).await.unwrap();
    assert_eq!(store.load("a").await.unwrap().unwrap().version, 2);
}

#[tokio::test]
async fn test_torn_trailing_line_does_not_block_writes() {
    let (_dir, store) = build_store_for_test();
    let mut record = record_with(AggregateKind::Agent, "a1", 0, &["agent.a.started"]);
    store.save(&mut record).await.unwrap();

    let mut file = OpenOptions::new()
        .append(true)
        .open(&store.log_path)
        .unwrap();
    write!(file, "{{\"aggregate_id\":\"a2\",\"seq").unwrap();
    drop(file);

    let mut fresh = record_with(AggregateKind::Agent, "brand-new", 0, &["agent.b.started"]);
    store.save(&mut fresh).await.unwrap();

    assert_eq!(store.load("a1").await.unwrap().unwrap().version, 1);
    assert_eq!(store.load("brand-new").await.unwrap().unwrap().version, 1);
    assert!(store.load("a2").await.unwrap().is_none());

    let log = std::fs::read_to_string(&store.log_path).unwrap();
    assert_eq!(log.lines().count(), 3);
    assert!(log.ends_with('\n'));
}

#[tokio::test]
async fn test_router_recovers_after_torn_write() {
    let (_dir, store) = build_store_for_test();
    let log_path = store.log_path.clone();
    let router = crate::router::AggregateRouter::new(std::sync::Arc::new(store));
    router
        .route(EventRequest::new("agent.a.started").with_aggregate_id("a1"))
        .await
        .unwrap();

    let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
    write!(file, "{{\"aggregate_id\":\"a2\",\"seq").unwrap();
    drop(file);

    let (aggregate, _) = router
        .route(EventRequest::new("agent.b.started").with_aggregate_id("brand-new"))
        .await
        .unwrap();
    assert_eq!(aggregate.status(), "started");
    let (aggregate, _) = router
        .route(EventRequest::new("agent.a.completed").with_aggregate_id("a1"))
        .await
        .unwrap();
    assert_eq!(aggregate.status(), "completed");
}

#[tokio::test]
async fn test_attributes_survive_round_trip() {
    let (_dir, store) = build_store_for_test();
    let mut record = AggregateRecord::new(AnyAggregate::new(AggregateKind::Workflow, "w1"), 0);
    let attributes = json!({"user_prompt": "build it"})
        .as_object()
        .cloned()
        .unwrap();
    record.record(event(
        AggregateKind::Workflow,
        "w1",
        "workflow.started",
        attributes,
    ));
    store.save(&mut record).await.unwrap();

    let loaded = store.load("w1").await.unwrap().unwrap();
    let workflow = loaded.aggregate.as_workflow().unwrap();
    assert_eq!(workflow.user_prompt.as_deref(), Some("build it"));
}

#[tokio::test]
async fn test_memory_store_matches_file_store_conflicts() {
    let store = InMemoryEventStore::new();
    let mut first = record_with(AggregateKind::Agent, "agent-1", 0, &["agent.x.started"]);
    store.save(&mut first).await.unwrap();
    assert_eq!(store.len().await, 1);

    let mut stale = record_with(AggregateKind::Agent, "agent-1", 0, &["agent.x.completed"]);
    assert!(matches!(
        store.save(&mut stale).await,
        Err(StoreError::Conflict { .. })
    ));

    let loaded = store.load("agent-1").await.unwrap().unwrap();
    assert_eq!(loaded.version, 1);
    assert_eq!(loaded.aggregate.status(), "started");
}
