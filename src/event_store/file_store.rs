//! File-based event store implementation.
//!
//! Stores events as JSONL (one JSON object per line) with:
//! - Per-aggregate sequence numbers
//! - Optimistic concurrency under an exclusive file lock
//! - Shared locks for readers
//! - Malformed lines skipped with a warning

use super::EventStore;
use crate::domain::{AggregateKind, AggregateRecord, Event, StoreError, TimestampUtc};
use async_trait::async_trait;
use cqrs_es::DomainEvent;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

/// A stored event record in the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub aggregate_id: String,
    pub sequence: u64,
    pub recorded_at: TimestampUtc,
    pub event_type: String,
    pub event_version: String,
    pub event: Event,
}

/// JSONL event log shared by every aggregate.
#[derive(Debug, Clone)]
pub struct FileEventStore {
    /// Path to the JSONL event log file.
    pub log_path: PathBuf,
}

impl FileEventStore {
    /// Creates a new file event store.
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// Reads every stored record under a shared lock.
    fn read_all(&self) -> Result<Vec<StoredEvent>, StoreError> {
        let file = match File::open(&self.log_path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        // The lock is released when the handle is dropped.
        file.lock_shared()?;
        read_records(&file)
    }
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn load(&self, aggregate_id: &str) -> Result<Option<AggregateRecord>, StoreError> {
        let stream = self
            .read_all()?
            .into_iter()
            .filter(|stored| stored.aggregate_id == aggregate_id)
            .map(|stored| stored.event);
        Ok(AggregateRecord::replay(stream))
    }

    async fn save(&self, record: &mut AggregateRecord) -> Result<(), StoreError> {
        if record.pending().is_empty() {
            return Ok(());
        }

        // Ensure parent directory exists
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.log_path)?;

        // Acquire exclusive lock for writing
        file.lock_exclusive()?;

        let aggregate_id = record.aggregate.id().to_string();

        // Check for concurrent writes (optimistic concurrency)
        let last_sequence = read_last_sequence(&file, &aggregate_id)?;
        if last_sequence != record.version {
            return Err(StoreError::Conflict {
                aggregate_id,
                expected: record.version,
                actual: last_sequence,
            });
        }

        // Start on a fresh line so a torn tail cannot swallow the new records.
        if ends_mid_line(&file)? {
            writeln!(file)?;
        }

        let mut sequence = last_sequence;
        for event in record.pending() {
            sequence += 1;
            let stored = StoredEvent {
                aggregate_id: aggregate_id.clone(),
                sequence,
                recorded_at: TimestampUtc::now(),
                event_type: event.event_type(),
                event_version: event.event_version(),
                event: event.clone(),
            };
            let line = serde_json::to_string(&stored)?;
            writeln!(file, "{}", line)?;
        }

        // Ensure all data is persisted
        file.flush()?;
        file.sync_all()?;

        record.mark_committed();
        Ok(())
    }

    async fn load_events_by_type(&self, kind: AggregateKind) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .read_all()?
            .into_iter()
            .map(|stored| stored.event)
            .filter(|event| event.aggregate_type == kind)
            .collect())
    }
}

/// Parses every line of the log from the current handle position.
///
/// Lines that do not hold a valid record, such as a torn final line left by
/// an interrupted append, are logged and skipped.
fn read_records(file: &File) -> Result<Vec<StoredEvent>, StoreError> {
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (index, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        let line = String::from_utf8_lossy(&line);
        if line.trim().is_empty() {
            continue;
        }
        let parsed = serde_json::from_str::<StoredEvent>(&line)
            .map_err(StoreError::from)
            .and_then(|stored| validate_stored(&stored).map(|()| stored));
        match parsed {
            Ok(stored) => records.push(stored),
            Err(e) => tracing::warn!(
                line = index + 1,
                error = %e,
                "Skipping malformed event log entry"
            ),
        }
    }

    Ok(records)
}

/// True when the log is non-empty and its last byte is not a newline.
fn ends_mid_line(file: &File) -> Result<bool, StoreError> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    let mut handle = file.try_clone()?;
    handle.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    handle.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Rejects records whose envelope disagrees with the embedded event.
fn validate_stored(stored: &StoredEvent) -> Result<(), StoreError> {
    if stored.event_type != stored.event.event_type()
        || stored.event_version != stored.event.event_version()
        || stored.aggregate_id != stored.event.aggregate_id
    {
        return Err(StoreError::Io(std::io::Error::new(
            ErrorKind::InvalidData,
            format!(
                "event {} (sequence {}) has a mismatched envelope",
                stored.event.event_id, stored.sequence
            ),
        )));
    }
    Ok(())
}

/// Read the last sequence number for an aggregate from the log file.
fn read_last_sequence(file: &File, aggregate_id: &str) -> Result<u64, StoreError> {
    let mut handle = file.try_clone()?;
    handle.seek(SeekFrom::Start(0))?;

    Ok(read_records(&handle)?
        .iter()
        .filter(|stored| stored.aggregate_id == aggregate_id)
        .map(|stored| stored.sequence)
        .max()
        .unwrap_or(0))
}

/// Default event log location: `~/.event-orchestrator/events.jsonl`.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".event-orchestrator").join("events.jsonl"))
}

#[cfg(test)]
#[path = "tests/file_store_tests.rs"]
mod tests;
