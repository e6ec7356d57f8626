//! Wiring of the long-lived tasks.
//!
//! ```text
//! EventSource -> StreamConsumer -> EventForwarder -> Scheduler -> TaskExecutor
//!                                      |                              |
//!                                      v                              v
//!                               RouterHandle (projection)      LifecycleSink
//! ```
//!
//! Shutdown flips one watch flag: the consumer stops reading, the forwarder
//! drains what was already accepted, the scheduler waits for in-flight work,
//! and the router actor stops last.

use crate::agents::{resolve_binary, ClaudeInvocation};
use crate::config::{OrchestratorConfig, SinkKind, StreamMode};
use crate::domain::RouteError;
use crate::event_store::FileEventStore;
use crate::orchestration::{
    Dispatcher, ExecutorSettings, HandlerRegistry, LifecycleSink, Scheduler, SchedulerStats,
    TaskExecutor, WorkItem,
};
use crate::router::{AggregateRouter, RouterHandle};
use crate::stream::{
    ConsumerStats, EventApiClient, EventSource, PollingSource, SseSource, StreamConsumer,
    StreamedEvent,
};
use crate::structured_logger::StructuredLogger;
use anyhow::{Context, Result};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Counters of one orchestrator run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub consumer: ConsumerStats,
    pub forwarder: ForwarderStats,
    pub scheduler: SchedulerStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwarderStats {
    pub received: u64,
    pub projected: u64,
    pub enqueued: u64,
}

/// Projects accepted stream events into the aggregates and hands the work
/// they generate to the scheduler.
pub struct EventForwarder {
    dispatcher: Dispatcher,
    projection: Option<RouterHandle>,
    work_tx: mpsc::UnboundedSender<WorkItem>,
    audit: Option<Arc<StructuredLogger>>,
}

impl EventForwarder {
    pub fn new(dispatcher: Dispatcher, work_tx: mpsc::UnboundedSender<WorkItem>) -> Self {
        Self {
            dispatcher,
            projection: None,
            work_tx,
            audit: None,
        }
    }

    pub fn with_projection(mut self, router: RouterHandle) -> Self {
        self.projection = Some(router);
        self
    }

    pub fn with_audit_log(mut self, audit: Arc<StructuredLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Runs until the consumer side of `events` is gone.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<StreamedEvent>) -> ForwarderStats {
        let mut stats = ForwarderStats::default();
        while let Some(event) = events.recv().await {
            stats.received += 1;
            if self.project(&event).await {
                stats.projected += 1;
            }
            if self.enqueue(&event) {
                stats.enqueued += 1;
            }
        }
        tracing::debug!(stats = ?stats, "Event forwarder stopped");
        stats
    }

    async fn project(&self, event: &StreamedEvent) -> bool {
        let Some(router) = &self.projection else {
            return false;
        };
        match router.route(event.to_request()).await {
            Ok((aggregate, _)) => {
                tracing::debug!(
                    event_name = event.event_name(),
                    aggregate_id = aggregate.id(),
                    status = aggregate.status(),
                    "Projected stream event"
                );
                true
            }
            Err(RouteError::InvalidEventName(name)) => {
                tracing::debug!(event_name = %name, "Stream event has no aggregate family");
                false
            }
            Err(e) => {
                tracing::warn!(
                    event_id = event.event_id().unwrap_or_default(),
                    event_name = event.event_name(),
                    error = %e,
                    "Failed to project stream event"
                );
                false
            }
        }
    }

    fn enqueue(&self, event: &StreamedEvent) -> bool {
        let Some(item) = self.dispatcher.dispatch(event) else {
            return false;
        };
        tracing::info!(
            work_item_id = %item.id,
            agent_type = %item.agent_type,
            priority = item.priority,
            "Work item queued"
        );
        if let Some(audit) = &self.audit {
            audit.log_work_enqueued(&item);
        }
        if self.work_tx.send(item).is_err() {
            tracing::warn!("Scheduler stopped, work item dropped");
            return false;
        }
        true
    }
}

pub struct Orchestrator {
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self { config }
    }

    /// Runs against the configured event API until a process signal arrives.
    pub async fn run(self) -> Result<RunSummary> {
        let api = self.api_client()?;
        let source: Arc<dyn EventSource> = match self.config.stream_mode {
            StreamMode::Sse => Arc::new(SseSource::new(api)),
            StreamMode::Poll => Arc::new(PollingSource::new(api, self.config.poll_interval())),
        };
        self.run_until(source, super::shutdown::wait_for_signal())
            .await
    }

    /// Runs against `source` until `shutdown` resolves.
    pub async fn run_until(
        self,
        source: Arc<dyn EventSource>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<RunSummary> {
        let config = &self.config;
        let run_id = chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let audit = match &config.log_dir {
            Some(dir) => Some(Arc::new(StructuredLogger::new(&run_id, dir)?)),
            None => None,
        };

        let event_log = config.event_log_path()?;
        tracing::info!(
            api_url = %config.api_url,
            event_log = %event_log.display(),
            project_root = %config.project_root.display(),
            max_concurrent = config.max_concurrent,
            "Starting orchestrator"
        );
        let router = AggregateRouter::new(Arc::new(FileEventStore::new(event_log)));
        let (router_handle, router_join) = RouterHandle::spawn(router).await?;

        let sink: Arc<dyn LifecycleSink> = match config.lifecycle_sink {
            SinkKind::Local => Arc::new(router_handle.clone()),
            SinkKind::Api => Arc::new(self.api_client()?),
        };
        let mut executor = TaskExecutor::new(self.executor_settings(), sink);
        if let Some(audit) = &audit {
            executor = executor.with_audit_log(audit.clone());
        }

        let (work_tx, work_rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(config.scheduler_config(), Arc::new(executor), work_rx);

        let dispatcher = Dispatcher::new(HandlerRegistry::new(&config.project_root));
        let handlers = dispatcher.handlers().discover();
        if !handlers.is_empty() {
            tracing::info!(handlers = ?handlers, "Discovered event handlers");
        }
        let mut forwarder = EventForwarder::new(dispatcher, work_tx);
        if config.project_stream_events {
            forwarder = forwarder.with_projection(router_handle.clone());
        }

        let dedup_capacity =
            NonZeroUsize::new(config.dedup_capacity).context("dedup_capacity must be positive")?;
        let mut consumer =
            StreamConsumer::new(source, dedup_capacity).with_policy(config.reconnect_policy());
        if let Some(audit) = audit {
            consumer = consumer.with_audit_log(audit.clone());
            forwarder = forwarder.with_audit_log(audit);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let consumer_task = tokio::spawn(consumer.run(shutdown_rx.clone(), event_tx));
        let forwarder_task = tokio::spawn(forwarder.run(event_rx));
        let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx));

        super::shutdown::signal_shutdown(shutdown, shutdown_tx).await;

        let consumer = consumer_task.await.context("stream consumer task failed")?;
        let forwarder = forwarder_task.await.context("event forwarder task failed")?;
        let scheduler = scheduler_task.await.context("scheduler task failed")?;

        router_handle.stop();
        if let Err(e) = router_join.await {
            tracing::warn!(error = %e, "Router actor did not stop cleanly");
        }

        let summary = RunSummary {
            consumer,
            forwarder,
            scheduler,
        };
        tracing::info!(summary = ?summary, "Orchestrator stopped");
        Ok(summary)
    }

    fn api_client(&self) -> Result<EventApiClient> {
        EventApiClient::new(&self.config.api_url, self.config.max_retries)
            .context("Failed to create event API client")
    }

    fn executor_settings(&self) -> ExecutorSettings {
        let config = &self.config;
        let binary = resolve_binary(&config.claude_binary);
        tracing::debug!(binary = %binary.display(), "Resolved agent binary");
        ExecutorSettings {
            invocation: ClaudeInvocation::new(binary, config.project_root.clone())
                .with_skip_permissions(config.skip_permissions),
            initiator_timeout: config.initiator_timeout(),
            handler_timeout: config.handler_timeout(),
            initiator_prompt_suffix: config.initiator_prompt_suffix.clone(),
            placeholder_delay: config.placeholder_delay(),
        }
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
