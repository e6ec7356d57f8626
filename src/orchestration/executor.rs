//! Work item execution.
//!
//! Every item emits `agent.<type>.started` before running and exactly one of
//! `agent.<type>.completed` or `agent.<type>.failed` afterwards. Execution
//! errors become failed lifecycle events and never reach the scheduler.
//! Events an agent reports in its stdout are published in between.

use super::dispatcher::INITIATOR_AGENT_TYPE;
use super::sink::LifecycleSink;
use super::WorkItem;
use crate::agents::{
    agent_event_request, handler_prompt, initiator_prompt, parse_agent_events, run_process,
    ClaudeInvocation, RunnerConfig, RunnerError,
};
use crate::domain::types::Attributes;
use crate::domain::{Clock, EventRequest};
use crate::structured_logger::StructuredLogger;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Causation and parent id of every lifecycle event emitted here.
pub const LIFECYCLE_CAUSATION_ID: &str = "listener";

/// Captured process output kept in lifecycle events, in characters.
pub const OUTPUT_TRUNCATE_CHARS: usize = 1000;

const AGENT_ID_SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    /// Real subprocess run of the work item's command.
    Initiator,
    /// Real subprocess run of an event-handler agent.
    EventHandler,
    /// Synthetic delay, then success.
    Placeholder,
}

impl ExecutionPath {
    pub fn for_agent_type(agent_type: &str) -> Self {
        if agent_type == INITIATOR_AGENT_TYPE {
            Self::Initiator
        } else if agent_type.ends_with("-handler") {
            Self::EventHandler
        } else {
            Self::Placeholder
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkOutcome {
    pub success: bool,
    pub message: String,
}

#[async_trait]
pub trait WorkExecutor: Send + Sync {
    async fn execute(&self, item: WorkItem) -> WorkOutcome;
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub invocation: ClaudeInvocation,
    pub initiator_timeout: Duration,
    pub handler_timeout: Duration,
    pub initiator_prompt_suffix: String,
    pub placeholder_delay: Duration,
}

/// Ids attached to the lifecycle events of one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub workflow_id: String,
}

impl AgentIdentity {
    /// `agent_id` is `<agent_type>-<unix secs>-<last '-' segment of the item
    /// id, at most 8 chars>`; `workflow_id` comes from the item context or is
    /// `orchestrator-<unix secs>`.
    pub fn for_item(item: &WorkItem, unix_secs: i64) -> Self {
        let suffix: String = item
            .id
            .rsplit('-')
            .next()
            .unwrap_or_default()
            .chars()
            .take(AGENT_ID_SUFFIX_LEN)
            .collect();
        let workflow_id = item
            .context_str("workflow_id")
            .map(str::to_string)
            .unwrap_or_else(|| format!("orchestrator-{}", unix_secs));
        Self {
            agent_id: format!("{}-{}-{}", item.agent_type, unix_secs, suffix),
            workflow_id,
        }
    }
}

pub struct TaskExecutor {
    settings: ExecutorSettings,
    sink: Arc<dyn LifecycleSink>,
    clock: Clock,
    audit: Option<Arc<StructuredLogger>>,
}

impl TaskExecutor {
    pub fn new(settings: ExecutorSettings, sink: Arc<dyn LifecycleSink>) -> Self {
        Self {
            settings,
            sink,
            clock: Clock::default(),
            audit: None,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit_log(mut self, audit: Arc<StructuredLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    async fn emit(
        &self,
        item: &WorkItem,
        identity: &AgentIdentity,
        action: &str,
        mut attributes: Attributes,
    ) {
        attributes.insert("agent_id".to_string(), json!(identity.agent_id));
        attributes.insert("agent_name".to_string(), json!(item.agent_type));
        let request = EventRequest::new(format!("agent.{}.{}", item.agent_type, action))
            .with_attributes(attributes)
            .with_aggregate_id(identity.agent_id.clone())
            .with_correlation_id(identity.workflow_id.clone())
            .with_causation_id(LIFECYCLE_CAUSATION_ID);

        if let Err(e) = self.sink.emit(request).await {
            tracing::error!(
                work_item_id = %item.id,
                agent_id = %identity.agent_id,
                action,
                error = %e,
                "Failed to emit lifecycle event"
            );
        }
    }

    async fn run_placeholder(&self, item: &WorkItem) -> (bool, Attributes) {
        tracing::info!(
            work_item_id = %item.id,
            agent_type = %item.agent_type,
            "No runner for agent type, completing placeholder"
        );
        tokio::time::sleep(self.settings.placeholder_delay).await;
        (
            true,
            attributes([
                ("message", json!(format!("Work item processed: {}", item.description))),
            ]),
        )
    }

    /// Publishes the `<EVENT>` blocks found in an agent's stdout. Returns how
    /// many the sink accepted.
    async fn publish_agent_events(
        &self,
        item: &WorkItem,
        identity: &AgentIdentity,
        stdout: &str,
    ) -> usize {
        let mut published = 0;
        for event in parse_agent_events(stdout) {
            let Some(request) =
                agent_event_request(&event, &identity.agent_id, &identity.workflow_id)
            else {
                tracing::warn!(work_item_id = %item.id, "Agent event has no name, skipping");
                continue;
            };
            let event_name = request.event_name.clone();
            match self.sink.emit(request).await {
                Ok(()) => published += 1,
                Err(e) => tracing::error!(
                    work_item_id = %item.id,
                    event_name = %event_name,
                    error = %e,
                    "Failed to publish agent event"
                ),
            }
        }
        if published > 0 {
            tracing::info!(work_item_id = %item.id, published, "Published agent events");
        }
        published
    }

    async fn run_initiator(&self, item: &WorkItem, identity: &AgentIdentity) -> (bool, Attributes) {
        let Some(command) = item.context_str("command") else {
            return (false, attributes([("message", json!("work item has no command"))]));
        };
        tracing::info!(work_item_id = %item.id, command, "Invoking workflow initiator");
        let prompt = initiator_prompt(command, &self.settings.initiator_prompt_suffix);
        self.run_agent(
            item,
            identity,
            &prompt,
            self.settings.initiator_timeout,
            ("command", command),
        )
        .await
    }

    async fn run_handler(&self, item: &WorkItem, identity: &AgentIdentity) -> (bool, Attributes) {
        let handler = item.context_str("handler").unwrap_or(&item.agent_type);
        let event = item.context.get("event").cloned().unwrap_or(Value::Null);
        tracing::info!(work_item_id = %item.id, handler, "Invoking event handler");
        let prompt = handler_prompt(handler, &event);
        self.run_agent(
            item,
            identity,
            &prompt,
            self.settings.handler_timeout,
            ("handler", handler),
        )
        .await
    }

    async fn run_agent(
        &self,
        item: &WorkItem,
        identity: &AgentIdentity,
        prompt: &str,
        timeout: Duration,
        label: (&str, &str),
    ) -> (bool, Attributes) {
        let invocation = &self.settings.invocation;
        let config = RunnerConfig::new(
            item.agent_type.clone(),
            invocation.project_root().to_path_buf(),
        )
        .with_overall_timeout(timeout);

        let (success, mut attrs) = match run_process(invocation.command(prompt), &config).await {
            Ok(output) => {
                let return_code = output.return_code.map_or(Value::Null, |code| json!(code));
                let message = match output.return_code {
                    Some(code) => format!("Command executed with return code {}", code),
                    None => "Command terminated by signal".to_string(),
                };
                let published = self.publish_agent_events(item, identity, &output.stdout).await;
                (
                    output.success(),
                    attributes([
                        ("message", json!(message)),
                        ("return_code", return_code),
                        ("stdout", json!(truncate_chars(&output.stdout))),
                        ("stderr", json!(truncate_chars(&output.stderr))),
                        ("published_events", json!(published)),
                    ]),
                )
            }
            Err(RunnerError::Timeout { .. }) => (
                false,
                attributes([("message", json!("Agent execution timed out"))]),
            ),
            Err(e) => (
                false,
                attributes([("message", json!(format!("Agent execution failed: {}", e)))]),
            ),
        };
        attrs.insert(label.0.to_string(), json!(label.1));
        (success, attrs)
    }
}

#[async_trait]
impl WorkExecutor for TaskExecutor {
    async fn execute(&self, item: WorkItem) -> WorkOutcome {
        let identity = AgentIdentity::for_item(&item, self.clock.now().unix_seconds());
        tracing::info!(
            work_item_id = %item.id,
            agent_id = %identity.agent_id,
            priority = item.priority,
            "Executing work item: {}",
            item.description
        );

        self.emit(
            &item,
            &identity,
            "started",
            attributes([
                ("work_item_id", json!(item.id)),
                ("description", json!(item.description)),
            ]),
        )
        .await;

        let (success, mut attrs) = match ExecutionPath::for_agent_type(&item.agent_type) {
            ExecutionPath::Initiator => self.run_initiator(&item, &identity).await,
            ExecutionPath::EventHandler => self.run_handler(&item, &identity).await,
            ExecutionPath::Placeholder => self.run_placeholder(&item).await,
        };
        attrs.insert("success".to_string(), json!(success));
        attrs.insert("work_item_id".to_string(), json!(item.id));
        attrs.insert("end_time".to_string(), json!(self.clock.now().to_rfc3339()));
        let message = attrs
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let action = if success { "completed" } else { "failed" };
        self.emit(&item, &identity, action, attrs).await;

        if success {
            tracing::info!(work_item_id = %item.id, "Work item completed: {}", message);
        } else {
            tracing::warn!(work_item_id = %item.id, "Work item failed: {}", message);
        }
        if let Some(audit) = &self.audit {
            audit.log_work_outcome(&item, success, &message);
        }

        WorkOutcome { success, message }
    }
}

fn attributes<const N: usize>(pairs: [(&str, Value); N]) -> Attributes {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

fn truncate_chars(text: &str) -> String {
    text.chars().take(OUTPUT_TRUNCATE_CHARS).collect()
}

#[cfg(test)]
#[path = "tests/executor_tests.rs"]
mod tests;
