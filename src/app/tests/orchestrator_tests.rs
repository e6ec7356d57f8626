use super::*;
use crate::domain::AggregateKind;
use crate::event_store::EventStore;
use crate::stream::{ItemStream, StreamError, StreamItem};
use futures::StreamExt;
use serde_json::json;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

const DISK_ERROR_ID: &str = "aaaaaaaa-1111-4111-8111-111111111111";
const DEPLOY_ID: &str = "bbbbbbbb-2222-4222-8222-222222222222";

/// Delivers its items on the first connection and then stays open.
struct OnceSource {
    items: Mutex<Option<Vec<StreamItem>>>,
}

#[async_trait::async_trait]
impl EventSource for OnceSource {
    async fn connect(&self) -> Result<ItemStream, StreamError> {
        let items = self.items.lock().unwrap().take().unwrap_or_default();
        Ok(futures::stream::iter(items.into_iter().map(Ok))
            .chain(futures::stream::pending())
            .boxed())
    }
}

fn created(id: &str, name: &str, attributes: serde_json::Value) -> StreamItem {
    StreamItem::EventCreated(StreamedEvent::new(json!({
        "event_id": id,
        "event_name": name,
        "attributes": attributes,
        "timestamp": "2025-06-01T12:00:00+00:00"
    })))
}

fn config(root: &Path) -> OrchestratorConfig {
    let project_root = root.join("project");
    let registry = HandlerRegistry::new(&project_root);
    std::fs::create_dir_all(registry.handlers_dir()).unwrap();
    std::fs::write(registry.handler_path("system.deploy-handler"), "# deploy\n").unwrap();

    OrchestratorConfig {
        project_root,
        claude_binary: "/nonexistent/claude".to_string(),
        event_log_path: Some(root.join("events.jsonl")),
        log_dir: Some(root.join("logs")),
        work_queue_check_interval_secs: 0.01,
        placeholder_delay_ms: 0,
        shutdown_timeout_secs: 5,
        ..OrchestratorConfig::default()
    }
}

async fn wait_for_agent_events(log: &Path, count: usize) -> Vec<crate::domain::Event> {
    let store = FileEventStore::new(log);
    for _ in 0..500 {
        let events = store
            .load_events_by_type(AggregateKind::Agent)
            .await
            .unwrap_or_default();
        if events.len() >= count {
            return events;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("agent lifecycle events never reached the event log");
}

#[tokio::test]
async fn test_stream_events_become_projected_work() {
    let dir = TempDir::new().unwrap();
    let config = config(dir.path());
    let log = config.event_log_path().unwrap();
    let source = Arc::new(OnceSource {
        items: Mutex::new(Some(vec![
            StreamItem::Heartbeat,
            created(DISK_ERROR_ID, "system.disk_error", json!({"session_id": "s1"})),
            created(DEPLOY_ID, "system.deploy", json!({"session_id": "s1"})),
            created(DISK_ERROR_ID, "system.disk_error", json!({"session_id": "s1"})),
        ])),
    });

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let run = tokio::spawn(Orchestrator::new(config).run_until(source, async move {
        let _ = stop_rx.await;
    }));

    let events = wait_for_agent_events(&log, 4).await;
    stop_tx.send(()).unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(summary.consumer.forwarded, 2);
    assert_eq!(summary.consumer.duplicates, 1);
    assert_eq!(
        summary.forwarder,
        ForwarderStats {
            received: 2,
            projected: 2,
            enqueued: 2,
        }
    );
    assert_eq!(summary.scheduler.started, 2);
    assert_eq!(summary.scheduler.succeeded, 1);
    assert_eq!(summary.scheduler.failed, 1);

    let mut names: Vec<&str> = events.iter().map(|e| e.event_name.as_str()).collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "agent.general-purpose.completed",
            "agent.general-purpose.started",
            "agent.system.deploy-handler.failed",
            "agent.system.deploy-handler.started",
        ]
    );
    assert!(events
        .iter()
        .all(|e| e.causation_id.as_deref() == Some("listener")));

    // The streamed system events keep their identity in the local projection.
    let store = FileEventStore::new(&log);
    let system = store
        .load_events_by_type(AggregateKind::System)
        .await
        .unwrap();
    assert_eq!(system.len(), 2);
    assert_eq!(system[0].event_id.to_string(), DISK_ERROR_ID);
    assert!(store.load("system_s1").await.unwrap().is_some());

    let audit = std::fs::read_to_string(dir.path().join("logs").join("orchestrator.jsonl")).unwrap();
    assert!(audit.lines().count() >= 5);
    assert!(audit.contains("system-check-aaaaaaaa"));
}

#[tokio::test]
async fn test_projection_can_be_disabled() {
    let dir = TempDir::new().unwrap();
    let config = OrchestratorConfig {
        project_stream_events: false,
        log_dir: None,
        ..config(dir.path())
    };
    let log = config.event_log_path().unwrap();
    let source = Arc::new(OnceSource {
        items: Mutex::new(Some(vec![created(
            DISK_ERROR_ID,
            "system.disk_warning",
            json!({}),
        )])),
    });

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let run = tokio::spawn(Orchestrator::new(config).run_until(source, async move {
        let _ = stop_rx.await;
    }));

    wait_for_agent_events(&log, 2).await;
    stop_tx.send(()).unwrap();
    let summary = run.await.unwrap().unwrap();

    assert_eq!(summary.forwarder.projected, 0);
    assert_eq!(summary.forwarder.enqueued, 1);
    let system = FileEventStore::new(&log)
        .load_events_by_type(AggregateKind::System)
        .await
        .unwrap();
    assert!(system.is_empty());
}

#[tokio::test]
async fn test_forwarder_skips_events_without_work() {
    let dir = TempDir::new().unwrap();
    let (work_tx, mut work_rx) = mpsc::unbounded_channel();
    let forwarder = EventForwarder::new(Dispatcher::new(HandlerRegistry::new(dir.path())), work_tx);
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    event_tx
        .send(StreamedEvent::new(json!({"event_name": "agent.coder.started"})))
        .unwrap();
    event_tx
        .send(StreamedEvent::new(json!({
            "event_id": "12345678-aaaa",
            "event_name": "system.session_started",
            "attributes": {"command": "/deploy"}
        })))
        .unwrap();
    drop(event_tx);

    let stats = forwarder.run(event_rx).await;
    assert_eq!(
        stats,
        ForwarderStats {
            received: 2,
            projected: 0,
            enqueued: 1,
        }
    );
    let item = work_rx.recv().await.unwrap();
    assert_eq!(item.id, "workflowInitiator-12345678");
    assert_eq!(item.priority, 3);
}
