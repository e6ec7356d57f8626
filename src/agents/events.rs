//! Structured events embedded in agent output.
//!
//! Agents report progress by printing `<EVENT>{json}</EVENT>` blocks anywhere
//! in their stdout. Each block holds one JSON object with a `name` (or
//! `event_name`) and optional `attributes`, ids and `timestamp`.

use crate::domain::{AggregateKind, Attributes, EventRequest, TimestampUtc};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{json, Map, Value};

const EVENT_BLOCK_PATTERN: &str = r"(?s)<EVENT>(.*?)</EVENT>";

/// Characters of a rejected block quoted in the warning.
const MALFORMED_PREVIEW_CHARS: usize = 100;

/// Extracts every well-formed event object from `output`, in order.
///
/// Blocks that are not valid JSON objects are logged and skipped.
pub fn parse_agent_events(output: &str) -> Vec<Map<String, Value>> {
    let re = match Regex::new(EVENT_BLOCK_PATTERN) {
        Ok(re) => re,
        Err(e) => {
            tracing::error!(error = %e, "Invalid event block pattern");
            return Vec::new();
        }
    };

    let mut events = Vec::new();
    for captures in re.captures_iter(output) {
        let Some(block) = captures.get(1) else {
            continue;
        };
        let block = block.as_str().trim();
        match serde_json::from_str::<Value>(block) {
            Ok(Value::Object(event)) => events.push(event),
            Ok(_) => warn_malformed(block, "not a JSON object"),
            Err(e) => warn_malformed(block, &e.to_string()),
        }
    }
    events
}

fn warn_malformed(block: &str, reason: &str) {
    let preview: String = block.chars().take(MALFORMED_PREVIEW_CHARS).collect();
    tracing::warn!(reason, "Skipping malformed agent event: {}", preview);
}

/// Builds the request that publishes an agent-reported event.
///
/// Names outside the `agent.`, `workflow.` and `system.` families are filed
/// under `agent.`. Missing ids default to the reporting agent and its
/// workflow. Returns `None` when the event has no name.
pub fn agent_event_request(
    event: &Map<String, Value>,
    agent_id: &str,
    workflow_id: &str,
) -> Option<EventRequest> {
    let raw_name = ["event_name", "name"]
        .iter()
        .find_map(|key| event.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|name| !name.is_empty())?;

    let (event_name, local_name) = match AggregateKind::from_event_name(raw_name) {
        Some(kind) => (
            raw_name.to_string(),
            raw_name.strip_prefix(kind.prefix()).unwrap_or(raw_name),
        ),
        None => (format!("{}{}", AggregateKind::Agent.prefix(), raw_name), raw_name),
    };

    let mut attributes: Attributes = match event.get("attributes") {
        Some(Value::Object(map)) => map.clone(),
        _ => Attributes::new(),
    };
    let mut parts = local_name.split('.');
    if let (Some(source), Some(event_type)) = (parts.next(), parts.next()) {
        attributes
            .entry("agent.name".to_string())
            .or_insert_with(|| json!(source));
        attributes
            .entry("event.type".to_string())
            .or_insert_with(|| json!(event_type));
    }
    let lowered = raw_name.to_lowercase();
    if lowered.contains("error") || lowered.contains("failed") {
        attributes
            .entry("status".to_string())
            .or_insert_with(|| json!("ERROR"));
    }

    let id = |key: &str| {
        event
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    let mut request = EventRequest::new(event_name).with_attributes(attributes);
    request.aggregate_id = Some(id("aggregate_id").unwrap_or_else(|| agent_id.to_string()));
    request.correlation_id = Some(id("correlation_id").unwrap_or_else(|| workflow_id.to_string()));
    request.causation_id = Some(id("causation_id").unwrap_or_else(|| agent_id.to_string()));
    request.timestamp = event
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| TimestampUtc(dt.with_timezone(&Utc)));
    Some(request)
}

#[cfg(test)]
#[path = "tests/events_tests.rs"]
mod tests;
