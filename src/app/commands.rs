//! One-shot `emit` and `inspect` commands.

use super::cli::EmitArgs;
use crate::config::OrchestratorConfig;
use crate::domain::EventRequest;
use crate::event_store::{EventStore, FileEventStore};
use crate::router::AggregateRouter;
use crate::stream::EventApiClient;
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::sync::Arc;

/// Parses `key=value`; the value is JSON when it parses, a string otherwise.
pub fn parse_attribute(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Attribute '{}' is not in key=value form", raw))?;
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("Attribute '{}' has an empty key", raw);
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub fn build_request(args: &EmitArgs) -> Result<EventRequest> {
    let mut request = EventRequest::new(args.event_name.clone());
    for raw in &args.attributes {
        let (key, value) = parse_attribute(raw)?;
        request = request.with_attribute(key, value);
    }
    request.aggregate_id = args.aggregate_id.clone();
    request.correlation_id = args.correlation_id.clone();
    request.causation_id = args.causation_id.clone();
    Ok(request)
}

/// Submits the event to the API, or routes it into the local event store with
/// `--local`. Returns what should be printed.
pub async fn emit(config: &OrchestratorConfig, args: &EmitArgs) -> Result<Value> {
    let request = build_request(args)?;
    if args.local {
        let store = FileEventStore::new(config.event_log_path()?);
        let router = AggregateRouter::new(Arc::new(store));
        let (aggregate, event) = router
            .route(request)
            .await
            .context("Failed to route event")?;
        return Ok(json!({
            "event_id": event.event_id,
            "aggregate_id": event.aggregate_id,
            "aggregate_type": event.aggregate_type,
            "status": aggregate.status(),
        }));
    }

    let client = EventApiClient::new(&config.api_url, config.max_retries)
        .context("Failed to create event API client")?;
    client
        .emit_event(&request)
        .await
        .with_context(|| format!("Failed to emit {} to {}", request.event_name, config.api_url))
}

/// Current state of one aggregate in the local event store.
pub async fn inspect(config: &OrchestratorConfig, aggregate_id: &str) -> Result<Value> {
    let store = FileEventStore::new(config.event_log_path()?);
    let record = store
        .load(aggregate_id)
        .await
        .context("Failed to read event log")?
        .with_context(|| format!("Aggregate '{}' not found", aggregate_id))?;
    Ok(json!({
        "version": record.version,
        "aggregate": record.aggregate,
    }))
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
