//! Agent aggregate: lifecycle of one agent invocation.

use crate::domain::aggregate::{end_time_of, ensure_target, start_time_of};
use crate::domain::errors::DomainError;
use crate::domain::event::{Event, RecordEvent};
use crate::domain::types::{attr_str, AggregateKind, LifecycleStatus};
use async_trait::async_trait;
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};

/// Agent event actions with dedicated apply rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentAction {
    Started,
    Completed,
    Failed,
    /// Any custom action (`agent.<name>.<anything>`).
    Other,
}

impl AgentAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "started" => Self::Started,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentAggregate {
    pub id: String,
    pub status: LifecycleStatus,
    pub agent_name: String,
    pub agent_id: String,
    pub parent_agent_id: Option<String>,
    pub workflow_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl AgentAggregate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    fn apply_started(&mut self, event: &Event) {
        self.status = LifecycleStatus::Started;
        self.agent_name = attr_str(&event.attributes, "agent_name")
            .map(str::to_string)
            .unwrap_or_else(|| agent_name_segment(&event.event_name).to_string());
        self.agent_id = event.aggregate_id.clone();
        self.parent_agent_id = event.causation_id.clone();
        self.workflow_id = event.correlation_id.clone();
        self.start_time = Some(start_time_of(event));
    }
}

/// Second segment of `agent.<name>.<action>`.
fn agent_name_segment(event_name: &str) -> &str {
    event_name.split('.').nth(1).unwrap_or_default()
}

#[async_trait]
impl Aggregate for AgentAggregate {
    type Command = RecordEvent;
    type Event = Event;
    type Error = DomainError;
    type Services = ();

    fn aggregate_type() -> String {
        AggregateKind::Agent.aggregate_type().to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        _services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        ensure_target(AggregateKind::Agent, &self.id, &command.event)?;
        Ok(vec![command.event])
    }

    fn apply(&mut self, event: Self::Event) {
        if self.id.is_empty() {
            self.id = event.aggregate_id.clone();
        }

        match AgentAction::parse(event.action()) {
            AgentAction::Started => self.apply_started(&event),
            AgentAction::Completed => {
                self.status = LifecycleStatus::Completed;
                self.end_time = Some(end_time_of(&event));
            }
            AgentAction::Failed => {
                self.status = LifecycleStatus::Failed;
                self.end_time = Some(end_time_of(&event));
            }
            AgentAction::Other => {
                if self.status == LifecycleStatus::Started {
                    self.status = LifecycleStatus::Running;
                }
            }
        }
    }
}
