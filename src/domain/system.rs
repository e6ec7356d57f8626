//! System aggregate: one orchestrator or client session.

use crate::domain::aggregate::{end_time_of, ensure_target, start_time_of};
use crate::domain::errors::DomainError;
use crate::domain::event::{Event, RecordEvent};
use crate::domain::types::{attr_scalar, AggregateKind, Attributes, SessionStatus};
use async_trait::async_trait;
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemAction {
    /// `system.started` or `system.session_started`.
    Started,
    /// `system.ended` or `system.session_ended`.
    Ended,
    Other,
}

impl SystemAction {
    pub fn parse(action: &str) -> Self {
        match action {
            "started" | "session_started" => Self::Started,
            "ended" | "session_ended" => Self::Ended,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemAggregate {
    pub id: String,
    pub status: SessionStatus,
    pub session_id: Option<String>,
    pub environment: Attributes,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl SystemAggregate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Aggregate for SystemAggregate {
    type Command = RecordEvent;
    type Event = Event;
    type Error = DomainError;
    type Services = ();

    fn aggregate_type() -> String {
        AggregateKind::System.aggregate_type().to_string()
    }

    async fn handle(
        &self,
        command: Self::Command,
        _services: &Self::Services,
    ) -> Result<Vec<Self::Event>, Self::Error> {
        ensure_target(AggregateKind::System, &self.id, &command.event)?;
        Ok(vec![command.event])
    }

    fn apply(&mut self, event: Self::Event) {
        if self.id.is_empty() {
            self.id = event.aggregate_id.clone();
        }

        match SystemAction::parse(event.action()) {
            SystemAction::Started => {
                self.status = SessionStatus::Started;
                self.session_id = attr_scalar(&event.attributes, "session_id");
                if let Some(Value::Object(environment)) = event.attribute("environment") {
                    self.environment = environment.clone();
                }
                self.start_time = Some(start_time_of(&event));
            }
            SystemAction::Ended => {
                self.status = SessionStatus::Ended;
                self.end_time = Some(end_time_of(&event));
            }
            SystemAction::Other => {
                if self.status == SessionStatus::Started {
                    self.status = SessionStatus::Running;
                }
            }
        }
    }
}
