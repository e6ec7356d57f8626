//! Strongly-typed domain values shared by events and aggregates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Free-form event payload.
pub type Attributes = serde_json::Map<String, Value>;

/// UTC timestamp wrapper used for every persisted instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimestampUtc(pub DateTime<Utc>);

impl TimestampUtc {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the timestamp as an RFC3339 string.
    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    /// Whole seconds since the Unix epoch.
    pub fn unix_seconds(&self) -> i64 {
        self.0.timestamp()
    }
}

impl Default for TimestampUtc {
    fn default() -> Self {
        Self::now()
    }
}

/// The three aggregate families an event can target.
///
/// Serialized as `agent`/`workflow`/`system`; the `*_aggregate` spellings used
/// by the event API are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    #[serde(alias = "agent_aggregate")]
    Agent,
    #[serde(alias = "workflow_aggregate")]
    Workflow,
    #[serde(alias = "system_aggregate")]
    System,
}

impl AggregateKind {
    pub const ALL: [AggregateKind; 3] = [Self::Agent, Self::Workflow, Self::System];

    /// Classifies an event name by its dotted prefix.
    pub fn from_event_name(event_name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| event_name.starts_with(kind.prefix()))
    }

    /// Name prefix including the trailing dot, e.g. `agent.`.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Agent => "agent.",
            Self::Workflow => "workflow.",
            Self::System => "system.",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Workflow => "workflow",
            Self::System => "system",
        }
    }

    /// Aggregate type label used on the wire by the event API.
    pub fn aggregate_type(&self) -> &'static str {
        match self {
            Self::Agent => "agent_aggregate",
            Self::Workflow => "workflow_aggregate",
            Self::System => "system_aggregate",
        }
    }

    /// Extracts the action part of an event name for this kind.
    ///
    /// Agent events are `agent.<name>.<action>`, so the action is the last
    /// segment. Workflow and system events carry everything after the prefix.
    pub fn action<'a>(&self, event_name: &'a str) -> &'a str {
        match self {
            Self::Agent => event_name.rsplit('.').next().unwrap_or(event_name),
            Self::Workflow | Self::System => event_name
                .strip_prefix(self.prefix())
                .unwrap_or(event_name),
        }
    }
}

impl Display for AggregateKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status machine shared by agent and workflow aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    #[default]
    Initialized,
    Started,
    Running,
    Completed,
    Failed,
}

impl LifecycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Status machine of a system session aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Initialized,
    Started,
    Running,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Running => "running",
            Self::Ended => "ended",
        }
    }
}

/// Reads a string attribute, treating empty strings as absent.
pub fn attr_str<'a>(attributes: &'a Attributes, key: &str) -> Option<&'a str> {
    attributes
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Renders a scalar attribute as a string (strings verbatim, numbers and
/// booleans via their JSON form).
pub fn attr_scalar(attributes: &Attributes, key: &str) -> Option<String> {
    match attributes.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Returns the option's contents unless it is an empty string.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.is_empty())
}
