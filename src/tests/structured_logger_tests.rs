use super::*;
use crate::orchestration::WorkItem;
use tempfile::TempDir;

fn create_test_logger() -> (StructuredLogger, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let logger = StructuredLogger::new("run-1", temp_dir.path()).expect("Failed to create logger");
    (logger, temp_dir)
}

fn read_entries(temp_dir: &TempDir) -> Vec<LogEntry> {
    let content = std::fs::read_to_string(temp_dir.path().join(AUDIT_LOG_FILE))
        .expect("Failed to read log file");
    content
        .lines()
        .map(|line| serde_json::from_str(line).expect("Failed to parse log entry"))
        .collect()
}

#[test]
fn test_log_entries_are_valid_json() {
    let (logger, temp_dir) = create_test_logger();

    logger.log("TestComponent", serde_json::json!({"key": "value1"}));
    logger.log("TestComponent", serde_json::json!({"key": "value2"}));

    let entries = read_entries(&temp_dir);
    assert_eq!(entries.len(), 2);
    for entry in entries {
        assert_eq!(entry.run_id, "run-1");
        assert_eq!(entry.component, "TestComponent");
        assert!(entry.ts.ends_with('Z'));
    }
}

#[test]
fn test_sequence_numbers_monotonic() {
    let (logger, temp_dir) = create_test_logger();

    for i in 0..10 {
        logger.log("Test", serde_json::json!({"iteration": i}));
    }

    let mut prev_seq = 0u64;
    for entry in read_entries(&temp_dir) {
        assert!(entry.seq > prev_seq);
        prev_seq = entry.seq;
    }
    assert_eq!(prev_seq, 10);
}

#[test]
fn test_audit_helpers_record_types() {
    let (logger, temp_dir) = create_test_logger();
    let item = WorkItem::new("system-check-abc", "investigate", "general-purpose", 2);

    logger.log_event_accepted(Some("e1"), "system.error");
    logger.log_duplicate_skipped("e1");
    logger.log_work_enqueued(&item);
    logger.log_work_outcome(&item, false, "boom");

    let entries = read_entries(&temp_dir);
    let types: Vec<&str> = entries
        .iter()
        .filter_map(|e| e.event.get("type").and_then(Value::as_str))
        .collect();
    assert_eq!(
        types,
        vec![
            "EventAccepted",
            "DuplicateSkipped",
            "WorkEnqueued",
            "WorkOutcome"
        ]
    );
    assert_eq!(entries[2].event["priority"], 2);
    assert_eq!(entries[3].event["success"], false);
}

#[test]
fn test_appends_across_instances() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    StructuredLogger::new("a", temp_dir.path())
        .unwrap()
        .log("Test", "first");
    let logger = StructuredLogger::new("b", temp_dir.path()).unwrap();
    logger.log("Test", "second");

    let entries = read_entries(&temp_dir);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].run_id, "b");
    assert_eq!(logger.path(), &temp_dir.path().join(AUDIT_LOG_FILE));
}
