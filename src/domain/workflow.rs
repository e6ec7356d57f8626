//! Workflow aggregate: groups the agents taking part in one workflow run.

use crate::domain::aggregate::{end_time_of, ensure_target, start_time_of};
use crate::domain::errors::DomainError;
use crate::domain::event::{Event, RecordEvent};
use crate::domain::types::{attr_scalar, attr_str, AggregateKind, LifecycleStatus};
use async_trait::async_trait;
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowAction {
    Started,
    AgentAdded,
    Completed,
    Failed,
    Other,
}

impl WorkflowAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "started" => Self::Started,
            "agent_added" => Self::AgentAdded,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowAggregate {
    pub id: String,
    pub status: LifecycleStatus,
    pub workflow_id: String,
    pub user_prompt: Option<String>,
    /// Append-only, insertion ordered, no duplicates.
    pub agent_ids: Vec<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl WorkflowAggregate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    fn add_agent(&mut self, event: &Event) {
        if let Some(agent_id) = attr_scalar(&event.attributes, "agent_id") {
            if !self.agent_ids.contains(&agent_id) {
                self.agent_ids.push(agent_id);
            }
        }
        if self.status == LifecycleStatus::Started {
            self.status = LifecycleStatus::Running;
        }
    }
}

#[async_trait]
impl Aggregate for WorkflowAggregate {
    type Command = RecordEvent;
    type Event = Event;
    type Error = DomainError;
    type Services = ();

    fn aggregate_type() -> String {
        AggregateKind::Workflow.aggregate_type().to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        _services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        ensure_target(AggregateKind::Workflow, &self.id, &command.event)?;
        Ok(vec![command.event])
    }

    fn apply(&mut self, event: Self::Event) {
        if self.id.is_empty() {
            self.id = event.aggregate_id.clone();
        }

        match WorkflowAction::parse(event.action()) {
            WorkflowAction::Started => {
                self.status = LifecycleStatus::Started;
                self.workflow_id = event.aggregate_id.clone();
                self.user_prompt = attr_str(&event.attributes, "user_prompt").map(str::to_string);
                self.start_time = Some(start_time_of(&event));
            }
            WorkflowAction::AgentAdded => self.add_agent(&event),
            WorkflowAction::Completed => {
                self.status = LifecycleStatus::Completed;
                self.end_time = Some(end_time_of(&event));
            }
            WorkflowAction::Failed => {
                self.status = LifecycleStatus::Failed;
                self.end_time = Some(end_time_of(&event));
            }
            // Unknown workflow actions leave the state untouched.
            WorkflowAction::Other => {}
        }
    }
}
