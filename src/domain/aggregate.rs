//! Aggregate union, versioned records and replay.

use crate::domain::agent::AgentAggregate;
use crate::domain::errors::DomainError;
use crate::domain::event::{Event, RecordEvent};
use crate::domain::system::SystemAggregate;
use crate::domain::types::{attr_str, AggregateKind};
use crate::domain::workflow::WorkflowAggregate;
use cqrs_es::Aggregate;
use serde::{Deserialize, Serialize};

/// Any one of the three aggregate kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "aggregate_type", rename_all = "snake_case")]
pub enum AnyAggregate {
    Agent(AgentAggregate),
    Workflow(WorkflowAggregate),
    System(SystemAggregate),
}

impl AnyAggregate {
    /// Fresh aggregate of `kind` at `id`.
    pub fn new(kind: AggregateKind, id: &str) -> Self {
        match kind {
            AggregateKind::Agent => Self::Agent(AgentAggregate::new(id)),
            AggregateKind::Workflow => Self::Workflow(WorkflowAggregate::new(id)),
            AggregateKind::System => Self::System(SystemAggregate::new(id)),
        }
    }

    pub fn kind(&self) -> AggregateKind {
        match self {
            Self::Agent(_) => AggregateKind::Agent,
            Self::Workflow(_) => AggregateKind::Workflow,
            Self::System(_) => AggregateKind::System,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Agent(a) => &a.id,
            Self::Workflow(w) => &w.id,
            Self::System(s) => &s.id,
        }
    }

    /// Current status label (`started`, `running`, `ended`, ...).
    pub fn status(&self) -> &'static str {
        match self {
            Self::Agent(a) => a.status.as_str(),
            Self::Workflow(w) => w.status.as_str(),
            Self::System(s) => s.status.as_str(),
        }
    }

    /// Validates `event` against this aggregate and returns the events to record.
    pub async fn handle(&self, event: Event) -> Result<Vec<Event>, DomainError> {
        let command = RecordEvent::new(event);
        match self {
            Self::Agent(a) => a.handle(command, &()).await,
            Self::Workflow(w) => w.handle(command, &()).await,
            Self::System(s) => s.handle(command, &()).await,
        }
    }

    pub fn apply(&mut self, event: Event) {
        match self {
            Self::Agent(a) => a.apply(event),
            Self::Workflow(w) => w.apply(event),
            Self::System(s) => s.apply(event),
        }
    }

    pub fn as_agent(&self) -> Option<&AgentAggregate> {
        match self {
            Self::Agent(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_workflow(&self) -> Option<&WorkflowAggregate> {
        match self {
            Self::Workflow(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_system(&self) -> Option<&SystemAggregate> {
        match self {
            Self::System(s) => Some(s),
            _ => None,
        }
    }
}

/// An aggregate together with its stream version and uncommitted events.
///
/// `version` counts the events already persisted for the aggregate id.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRecord {
    pub aggregate: AnyAggregate,
    pub version: u64,
    pending: Vec<Event>,
}

impl AggregateRecord {
    pub fn new(aggregate: AnyAggregate, version: u64) -> Self {
        Self {
            aggregate,
            version,
            pending: Vec::new(),
        }
    }

    /// Applies `event` and queues it for the next save.
    pub fn record(&mut self, event: Event) {
        self.aggregate.apply(event.clone());
        self.pending.push(event);
    }

    pub fn pending(&self) -> &[Event] {
        &self.pending
    }

    /// Marks the pending events as persisted.
    pub fn mark_committed(&mut self) {
        self.version += self.pending.len() as u64;
        self.pending.clear();
    }

    /// Rebuilds an aggregate by left-folding its stored stream.
    ///
    /// An event of a different kind than the aggregate folded so far starts a
    /// fresh aggregate, which reproduces overwrite-by-recreation on reload.
    pub fn replay(events: impl IntoIterator<Item = Event>) -> Option<Self> {
        let mut current: Option<AnyAggregate> = None;
        let mut version = 0u64;

        for event in events {
            let mut aggregate = match current.take() {
                Some(aggregate) if aggregate.kind() == event.aggregate_type => aggregate,
                _ => AnyAggregate::new(event.aggregate_type, &event.aggregate_id),
            };
            aggregate.apply(event);
            current = Some(aggregate);
            version += 1;
        }

        current.map(|aggregate| Self::new(aggregate, version))
    }
}

/// Rejects events for another aggregate family or another instance.
pub(crate) fn ensure_target(
    expected: AggregateKind,
    aggregate_id: &str,
    event: &Event,
) -> Result<(), DomainError> {
    if event.aggregate_type != expected {
        return Err(DomainError::WrongAggregateKind {
            expected,
            found: event.aggregate_type,
        });
    }
    if !aggregate_id.is_empty() && aggregate_id != event.aggregate_id {
        return Err(DomainError::AggregateIdMismatch {
            expected: aggregate_id.to_string(),
            found: event.aggregate_id.clone(),
        });
    }
    Ok(())
}

/// `start_time` attribute, else the event's own timestamp.
pub(crate) fn start_time_of(event: &Event) -> String {
    attr_str(&event.attributes, "start_time")
        .map(str::to_string)
        .unwrap_or_else(|| event.timestamp.to_rfc3339())
}

/// `end_time` attribute verbatim, empty when absent.
pub(crate) fn end_time_of(event: &Event) -> String {
    attr_str(&event.attributes, "end_time")
        .map(str::to_string)
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "tests/aggregate_tests.rs"]
mod tests;
