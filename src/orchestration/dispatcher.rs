//! Work-generating rules for stream events.
//!
//! Rules are checked in order and the first match yields the only work item:
//! 1. `system.*` with a `command` attribute: workflow initiator, priority 3
//! 2. name containing `error` or `warning`: investigation, priority 2
//! 3. an event-handler agent exists for the name: handler run, priority 1

use super::handlers::HandlerRegistry;
use super::work_item::{
    WorkItem, PRIORITY_DEFAULT, PRIORITY_INVESTIGATION, PRIORITY_SYSTEM_COMMAND,
};
use crate::stream::StreamedEvent;

pub const INITIATOR_AGENT_TYPE: &str = "workflowInitiator";
pub const INVESTIGATION_AGENT_TYPE: &str = "general-purpose";

const SHORT_ID_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Dispatcher {
    handlers: HandlerRegistry,
}

impl Dispatcher {
    pub fn new(handlers: HandlerRegistry) -> Self {
        Self { handlers }
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub fn dispatch(&self, event: &StreamedEvent) -> Option<WorkItem> {
        system_command(event)
            .or_else(|| investigation(event))
            .or_else(|| self.event_handler(event))
    }

    fn event_handler(&self, event: &StreamedEvent) -> Option<WorkItem> {
        let event_name = event.event_name();
        if event_name.is_empty() {
            return None;
        }
        let handler = HandlerRegistry::handler_name(event_name);
        if !self.handlers.exists(&handler) {
            return None;
        }
        Some(
            WorkItem::new(
                format!("{}-{}", handler, short_id(event)),
                format!("Invoke event handler {} for {}", handler, event_name),
                handler.clone(),
                PRIORITY_DEFAULT,
            )
            .with_context("event", event.payload().clone())
            .with_context("handler", handler),
        )
    }
}

fn system_command(event: &StreamedEvent) -> Option<WorkItem> {
    if !event.event_name().starts_with("system.") {
        return None;
    }
    let attributes = event.attributes();
    let command = attributes
        .get("command")
        .and_then(|v| v.as_str())
        .filter(|c| !c.is_empty())?;

    Some(
        WorkItem::new(
            format!("{}-{}", INITIATOR_AGENT_TYPE, short_id(event)),
            format!("Execute system command via workflowInitiator: {}", command),
            INITIATOR_AGENT_TYPE,
            PRIORITY_SYSTEM_COMMAND,
        )
        .with_context("command", command)
        .with_context("original_event", event.payload().clone())
        .with_context(
            "session_id",
            event.attribute_str("session_id").unwrap_or_else(|| "default".to_string()),
        )
        .with_context(
            "source",
            event.attribute_str("source").unwrap_or_else(|| "unknown".to_string()),
        ),
    )
}

fn investigation(event: &StreamedEvent) -> Option<WorkItem> {
    let name = event.event_name().to_lowercase();
    if !name.contains("error") && !name.contains("warning") {
        return None;
    }
    Some(
        WorkItem::new(
            format!("system-check-{}", short_id(event)),
            format!("Investigate system event: {}", event.event_name()),
            INVESTIGATION_AGENT_TYPE,
            PRIORITY_INVESTIGATION,
        )
        .with_context("system_event", event.payload().clone()),
    )
}

/// First characters of the event id, or `unknown`.
fn short_id(event: &StreamedEvent) -> String {
    event
        .event_id()
        .map(|id| id.chars().take(SHORT_ID_LEN).collect())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
