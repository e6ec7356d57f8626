use crate::domain::types::{attr_str, Attributes, TimestampUtc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// System commands run by the workflow initiator.
pub const PRIORITY_SYSTEM_COMMAND: u8 = 3;
/// Investigation of error and warning events.
pub const PRIORITY_INVESTIGATION: u8 = 2;
pub const PRIORITY_DEFAULT: u8 = 1;

/// A unit of agent work derived from an event. Higher priority runs first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub description: String,
    pub agent_type: String,
    #[serde(default)]
    pub context: Attributes,
    pub priority: u8,
    pub created_at: TimestampUtc,
}

impl WorkItem {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        agent_type: impl Into<String>,
        priority: u8,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            agent_type: agent_type.into(),
            context: Attributes::new(),
            priority,
            created_at: TimestampUtc::now(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Non-empty string value from the context.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        attr_str(&self.context, key)
    }
}
