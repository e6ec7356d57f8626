//! JSONL audit trail of orchestrator decisions.
//!
//! Each line carries a monotonic sequence number, a microsecond UTC timestamp,
//! the process run id and the emitting component. The trail records accepted
//! and duplicate stream events, enqueued work items and work outcomes.

use crate::orchestration::WorkItem;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub const AUDIT_LOG_FILE: &str = "orchestrator.jsonl";

pub struct StructuredLogger {
    run_id: String,
    seq: AtomicU64,
    log_file: Mutex<File>,
    log_path: PathBuf,
}

#[derive(Serialize, serde::Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub ts: String,
    pub run_id: String,
    pub component: String,
    pub event: Value,
}

impl StructuredLogger {
    /// Opens `<logs_dir>/orchestrator.jsonl` for appending, creating the
    /// directory when needed.
    pub fn new(run_id: &str, logs_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(logs_dir)?;
        let log_path = logs_dir.join(AUDIT_LOG_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            run_id: run_id.to_string(),
            seq: AtomicU64::new(0),
            log_file: Mutex::new(file),
            log_path,
        })
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Appends one entry. Write failures are ignored.
    pub fn log(&self, component: &str, event: impl Serialize) {
        let entry = LogEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            run_id: self.run_id.clone(),
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(Value::Null),
        };

        if let Ok(mut file) = self.log_file.lock() {
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(file, "{}", line);
                let _ = file.flush();
            }
        }
    }

    pub fn log_event_accepted(&self, event_id: Option<&str>, event_name: &str) {
        self.log(
            "Stream",
            serde_json::json!({
                "type": "EventAccepted",
                "event_id": event_id,
                "event_name": event_name
            }),
        );
    }

    pub fn log_duplicate_skipped(&self, event_id: &str) {
        self.log(
            "Stream",
            serde_json::json!({
                "type": "DuplicateSkipped",
                "event_id": event_id
            }),
        );
    }

    pub fn log_work_enqueued(&self, item: &WorkItem) {
        self.log(
            "Dispatcher",
            serde_json::json!({
                "type": "WorkEnqueued",
                "work_item_id": item.id,
                "agent_type": item.agent_type,
                "priority": item.priority
            }),
        );
    }

    pub fn log_work_outcome(&self, item: &WorkItem, success: bool, message: &str) {
        self.log(
            "Executor",
            serde_json::json!({
                "type": "WorkOutcome",
                "work_item_id": item.id,
                "agent_type": item.agent_type,
                "success": success,
                "message": message
            }),
        );
    }

    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

#[cfg(test)]
#[path = "tests/structured_logger_tests.rs"]
mod tests;
