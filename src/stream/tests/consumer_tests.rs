use super::*;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::task::JoinHandle;

type Session = Result<Vec<Result<StreamItem, StreamError>>, StreamError>;

/// Replays scripted connections; once exhausted, connections stay open
/// without items.
struct ScriptedSource {
    sessions: Mutex<VecDeque<Session>>,
    connects: AtomicUsize,
}

impl ScriptedSource {
    fn new(sessions: Vec<Session>) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(sessions.into()),
            connects: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl EventSource for ScriptedSource {
    async fn connect(&self) -> Result<ItemStream, StreamError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let next = self.sessions.lock().unwrap().pop_front();
        match next {
            Some(Ok(items)) => Ok(Box::pin(futures::stream::iter(items))),
            Some(Err(e)) => Err(e),
            None => Ok(Box::pin(futures::stream::pending::<
                Result<StreamItem, StreamError>,
            >())),
        }
    }
}

fn created(id: Option<&str>, name: &str) -> Result<StreamItem, StreamError> {
    let mut payload = json!({"event_name": name, "attributes": {}});
    if let Some(id) = id {
        payload["event_id"] = json!(id);
    }
    Ok(StreamItem::EventCreated(StreamedEvent::new(payload)))
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        circuit_breaker_threshold: 2,
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    events: mpsc::UnboundedReceiver<StreamedEvent>,
    join: JoinHandle<ConsumerStats>,
}

fn start(consumer: StreamConsumer) -> Running {
    let (shutdown, shutdown_rx) = watch::channel(false);
    let (tx, events) = mpsc::unbounded_channel();
    let join = tokio::spawn(consumer.run(shutdown_rx, tx));
    Running {
        shutdown,
        events,
        join,
    }
}

async fn next_event(running: &mut Running) -> StreamedEvent {
    tokio::time::timeout(Duration::from_secs(5), running.events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

async fn stop(running: Running) -> ConsumerStats {
    running.shutdown.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running.join)
        .await
        .expect("consumer did not stop")
        .unwrap()
}

fn consumer(source: Arc<ScriptedSource>) -> StreamConsumer {
    StreamConsumer::new(source, NonZeroUsize::new(100).unwrap()).with_policy(fast_policy())
}

#[test]
fn test_backoff_delay() {
    let policy = ReconnectPolicy::default();
    assert_eq!(policy.delay(0), Duration::from_secs(5));
    assert_eq!(policy.delay(1), Duration::from_secs(10));
    assert_eq!(policy.delay(2), Duration::from_secs(20));
    assert_eq!(policy.delay(3), Duration::from_secs(40));
    assert_eq!(policy.delay(4), Duration::from_secs(60)); // capped at 60
    assert_eq!(policy.delay(50), Duration::from_secs(60));
}

#[tokio::test]
async fn test_forwards_new_events_and_skips_duplicates() {
    let source = ScriptedSource::new(vec![Ok(vec![
        created(Some("e1"), "system.started"),
        created(Some("e1"), "system.started"),
        Ok(StreamItem::Heartbeat),
        created(Some("e2"), "system.error"),
    ])]);
    let mut running = start(consumer(source));

    assert_eq!(next_event(&mut running).await.event_id(), Some("e1"));
    assert_eq!(next_event(&mut running).await.event_id(), Some("e2"));

    let stats = stop(running).await;
    assert_eq!(stats.forwarded, 2);
    assert_eq!(stats.duplicates, 1);
}

#[tokio::test]
async fn test_redelivery_after_reconnect_is_skipped() {
    let source = ScriptedSource::new(vec![
        Ok(vec![created(Some("e1"), "system.started")]),
        Ok(vec![
            created(Some("e1"), "system.started"),
            created(Some("e2"), "system.started"),
        ]),
    ]);
    let mut running = start(consumer(source.clone()));

    assert_eq!(next_event(&mut running).await.event_id(), Some("e1"));
    assert_eq!(next_event(&mut running).await.event_id(), Some("e2"));

    let stats = stop(running).await;
    assert_eq!(stats.duplicates, 1);
    assert!(source.connects.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_events_without_id_are_always_forwarded() {
    let source = ScriptedSource::new(vec![Ok(vec![
        created(None, "system.warning"),
        created(None, "system.warning"),
    ])]);
    let mut running = start(consumer(source));

    next_event(&mut running).await;
    next_event(&mut running).await;

    let stats = stop(running).await;
    assert_eq!(stats.forwarded, 2);
    assert_eq!(stats.duplicates, 0);
}

#[tokio::test]
async fn test_error_items_do_not_drop_the_connection() {
    let source = ScriptedSource::new(vec![Ok(vec![
        Ok(StreamItem::Error(json!({"error": "db"}))),
        Ok(StreamItem::Unknown("ping".to_string())),
        created(Some("e1"), "agent.a.started"),
    ])]);
    let mut running = start(consumer(source.clone()));

    assert_eq!(next_event(&mut running).await.event_id(), Some("e1"));
    let stats = stop(running).await;
    assert_eq!(stats.failures, 0);
}

#[tokio::test]
async fn test_reconnects_after_failures() {
    let source = ScriptedSource::new(vec![
        Err(StreamError::Connect("refused".to_string())),
        Err(StreamError::Connect("refused".to_string())),
        Ok(vec![
            created(Some("e1"), "system.started"),
            Err(StreamError::Read("reset".to_string())),
        ]),
        Ok(vec![created(Some("e2"), "system.started")]),
    ]);
    let mut running = start(consumer(source.clone()));

    assert_eq!(next_event(&mut running).await.event_id(), Some("e1"));
    assert_eq!(next_event(&mut running).await.event_id(), Some("e2"));

    let stats = stop(running).await;
    assert_eq!(stats.failures, 3);
    assert!(stats.connections >= 2);
    assert!(source.connects.load(Ordering::SeqCst) >= 4);
}

#[tokio::test]
async fn test_shutdown_interrupts_backoff() {
    let source = ScriptedSource::new(vec![Err(StreamError::Connect("refused".to_string()))]);
    let consumer = StreamConsumer::new(source, NonZeroUsize::new(10).unwrap()).with_policy(
        ReconnectPolicy {
            base_delay: Duration::from_secs(3600),
            max_delay: Duration::from_secs(3600),
            circuit_breaker_threshold: 1,
        },
    );
    let mut state = consumer.subscribe_state();
    let running = start(consumer);

    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConsumerState::Backoff),
    )
    .await
    .expect("consumer never backed off")
    .unwrap();

    let stats = stop(running).await;
    assert_eq!(stats.failures, 1);
    assert_eq!(*state.borrow(), ConsumerState::Disconnected);
}

#[tokio::test]
async fn test_stops_when_dispatcher_is_gone() {
    let source = ScriptedSource::new(vec![Ok(vec![created(Some("e1"), "system.started")])]);
    let (_shutdown, shutdown_rx) = watch::channel(false);
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);

    let stats = tokio::time::timeout(Duration::from_secs(5), consumer(source).run(shutdown_rx, tx))
        .await
        .expect("consumer did not stop");
    assert_eq!(stats.forwarded, 0);
}
