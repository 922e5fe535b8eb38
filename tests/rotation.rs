//! Integration tests for file rotation through the public sink API.
//!
//! These tests validate:
//! - Size rotation keeps every closed file within the limit
//! - Records survive rotation complete and in delivery order
//! - An oversized record lands alone in a fresh file
//! - A record that fits the limit only without framing counts as oversized
//! - A UTC date change opens a date-tagged file
//! - Shutdown without exports leaves no file behind
//! - Sinks with different run ids never share a file

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use opentelemetry::trace::{SpanId, TraceId};
use opentelemetry::KeyValue;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use telemetry_file_sink::records::{LogRecord, SpanRecord};
use telemetry_file_sink::sink::{FileSink, ManualClock, SinkOptions};
use telemetry_file_sink::TelemetryRecord;
use tempfile::tempdir;

// ============================================================================
// Test Helpers
// ============================================================================

/// Files of one kind and run, in rotation order.
fn run_files(dir: &Path, kind: &str, run_id: &str) -> Vec<PathBuf> {
    let prefix = format!("{kind}_{run_id}");
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            let name = path.file_name().unwrap().to_str().unwrap();
            name.starts_with(&prefix) && name.ends_with(".json")
        })
        .collect();
    files.sort();
    files
}

fn parse_array(path: &Path) -> Vec<Value> {
    let contents = fs::read_to_string(path).unwrap();
    match serde_json::from_str::<Value>(&contents) {
        Ok(Value::Array(items)) => items,
        other => panic!("{} is not a JSON array: {other:?}", path.display()),
    }
}

fn span(index: u64) -> SpanRecord {
    let start = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap();
    SpanRecord::new(
        TraceId::from(u128::from(index) + 1),
        SpanId::from(index + 1),
        format!("op-{index}"),
        start,
        start + ChronoDuration::milliseconds(5),
    )
    .with_tag(KeyValue::new("index", i64::try_from(index).unwrap()))
}

fn span_index(document: &Value) -> i64 {
    document["tags"][0]["value"]["intValue"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap()
}

// ============================================================================
// Size Rotation
// ============================================================================

#[test]
fn test_small_limit_rotates_and_keeps_every_record() {
    let dir = tempdir().unwrap();
    let options = SinkOptions::for_directory(dir.path())
        .with_max_file_size_bytes(500)
        .with_run_id("rot");
    let sink: FileSink<SpanRecord> = FileSink::new(options, None).unwrap();

    for index in 0..50 {
        assert!(sink.export(&[span(index)]).is_success());
    }
    assert!(sink.shutdown(Duration::from_secs(1)));

    let files = run_files(dir.path(), "traces", "rot");
    assert!(files.len() >= 2, "expected rotation, got {files:?}");
    assert_eq!(u64::try_from(files.len()).unwrap(), sink.files_opened());

    let mut indices = Vec::new();
    for file in &files {
        let size = fs::metadata(file).unwrap().len();
        let records = parse_array(file);
        assert!(!records.is_empty());
        // A file holding a single record may exceed the limit only if that
        // record alone does.
        if records.len() > 1 {
            assert!(size <= 500, "{} is {size} bytes", file.display());
        }
        indices.extend(records.iter().map(span_index));
    }

    assert_eq!(indices, (0..50).collect::<Vec<i64>>());
}

#[test]
fn test_batches_rotate_mid_batch_without_loss() {
    let dir = tempdir().unwrap();
    let options = SinkOptions::for_directory(dir.path())
        .with_max_file_size_bytes(1_000)
        .with_run_id("batch");
    let sink: FileSink<SpanRecord> = FileSink::new(options, None).unwrap();

    let batch: Vec<SpanRecord> = (0..30).map(span).collect();
    assert!(sink.export(&batch).is_success());
    sink.shutdown(Duration::ZERO);

    let files = run_files(dir.path(), "traces", "batch");
    assert!(files.len() > 1);
    assert!(files[1].ends_with("traces_batch_001.json"));

    let total: usize = files.iter().map(|file| parse_array(file).len()).sum();
    assert_eq!(total, 30);
}

#[test]
fn test_oversized_record_is_written_alone() {
    let dir = tempdir().unwrap();
    let options = SinkOptions::for_directory(dir.path())
        .with_max_file_size_bytes(64)
        .with_run_id("big");
    let sink: FileSink<LogRecord> = FileSink::new(options, None).unwrap();

    let timestamp = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap();
    let huge = LogRecord::new(timestamp, "app").with_body("x".repeat(1_000));
    let small = LogRecord::new(timestamp, "app").with_body("tail");

    assert!(sink.export(&[huge]).is_success());
    assert!(sink.export(&[small]).is_success());
    sink.shutdown(Duration::ZERO);

    let files = run_files(dir.path(), "logs", "big");
    assert_eq!(files.len(), 2);
    let first = parse_array(&files[0]);
    let second = parse_array(&files[1]);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0]["body"].as_str().unwrap().len(), 1_000);
    assert_eq!(second[0]["body"], "tail");
}

#[test]
fn test_record_filling_the_limit_without_framing_is_oversized() {
    let dir = tempdir().unwrap();
    let timestamp = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap();
    let record = LogRecord::new(timestamp, "app").with_body("y".repeat(400));
    let record_len = serde_json::to_vec(&record.to_document(None)).unwrap().len();

    // The record fits the limit on its own but not inside `[\n` ... `\n]\n`.
    let limit = u64::try_from(record_len).unwrap() + 2;
    let options = SinkOptions::for_directory(dir.path())
        .with_max_file_size_bytes(limit)
        .with_run_id("edge");
    let sink: FileSink<LogRecord> = FileSink::new(options, None).unwrap();

    assert!(sink.export(&[record.clone(), record]).is_success());
    sink.shutdown(Duration::ZERO);

    let files = run_files(dir.path(), "logs", "edge");
    assert_eq!(files.len(), 2);
    for file in &files {
        assert_eq!(parse_array(file).len(), 1);
        // Overshoot is bounded by the framing.
        assert_eq!(fs::metadata(file).unwrap().len(), limit + 3);
    }
}

// ============================================================================
// Date Rotation
// ============================================================================

#[test]
fn test_midnight_opens_date_tagged_file() {
    let dir = tempdir().unwrap();
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 0).unwrap());
    let options = SinkOptions::for_directory(dir.path()).with_run_id("night");
    let sink: FileSink<SpanRecord> = FileSink::new(options, None)
        .unwrap()
        .with_clock(Arc::new(clock.clone()));

    assert!(sink.export(&[span(0), span(1)]).is_success());
    clock.advance(ChronoDuration::minutes(2));
    assert!(sink.export(&[span(2)]).is_success());
    assert_eq!(
        sink.current_path().unwrap(),
        dir.path().join("traces_night_20270101.json")
    );
    sink.shutdown(Duration::ZERO);

    let before = parse_array(&dir.path().join("traces_night.json"));
    let after = parse_array(&dir.path().join("traces_night_20270101.json"));
    assert_eq!(before.iter().map(span_index).collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(after.iter().map(span_index).collect::<Vec<_>>(), vec![2]);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_shutdown_without_exports_creates_nothing() {
    let dir = tempdir().unwrap();
    let sink: FileSink<SpanRecord> =
        FileSink::new(SinkOptions::for_directory(dir.path()).with_run_id("idle"), None).unwrap();

    assert!(sink.export(&[]).is_success());
    assert!(sink.shutdown(Duration::ZERO));
    assert!(sink.shutdown(Duration::ZERO));

    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(sink.files_opened(), 0);
}

#[test]
fn test_force_flush_makes_records_visible() {
    let dir = tempdir().unwrap();
    let sink: FileSink<SpanRecord> =
        FileSink::new(SinkOptions::for_directory(dir.path()).with_run_id("flush"), None).unwrap();

    assert!(sink.export(&[span(7)]).is_success());
    assert!(sink.force_flush().is_success());

    // Still open: the closing bracket is missing but the record is on disk.
    let contents = fs::read_to_string(dir.path().join("traces_flush.json")).unwrap();
    assert!(contents.starts_with("[\n"));
    assert!(contents.contains("\"op-7\""));
    assert!(!contents.ends_with("]\n"));

    sink.shutdown(Duration::ZERO);
    assert_eq!(parse_array(&dir.path().join("traces_flush.json")).len(), 1);
}

#[test]
fn test_distinct_run_ids_never_collide() {
    let dir = tempdir().unwrap();
    let first: FileSink<SpanRecord> =
        FileSink::new(SinkOptions::for_directory(dir.path()).with_run_id("run-a"), None).unwrap();
    let second: FileSink<SpanRecord> =
        FileSink::new(SinkOptions::for_directory(dir.path()).with_run_id("run-b"), None).unwrap();

    assert!(first.export(&[span(1)]).is_success());
    assert!(second.export(&[span(2)]).is_success());
    assert_ne!(first.current_path(), second.current_path());
    first.shutdown(Duration::ZERO);
    second.shutdown(Duration::ZERO);

    assert_eq!(parse_array(&dir.path().join("traces_run-a.json")).len(), 1);
    assert_eq!(parse_array(&dir.path().join("traces_run-b.json")).len(), 1);
}

#[test]
fn test_existing_file_is_never_overwritten() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("traces_keep.json"), "[\n]\n").unwrap();

    let sink: FileSink<SpanRecord> =
        FileSink::new(SinkOptions::for_directory(dir.path()).with_run_id("keep"), None).unwrap();
    assert!(sink.export(&[span(3)]).is_success());
    sink.shutdown(Duration::ZERO);

    assert_eq!(fs::read_to_string(dir.path().join("traces_keep.json")).unwrap(), "[\n]\n");
    assert_eq!(parse_array(&dir.path().join("traces_keep_001.json")).len(), 1);
}

#[test]
fn test_span_round_trip_through_file() {
    let dir = tempdir().unwrap();
    let sink: FileSink<SpanRecord> =
        FileSink::new(SinkOptions::for_directory(dir.path()).with_run_id("trip"), None).unwrap();

    let record = span(41)
        .with_parent(SpanId::from(0x99))
        .with_tag(KeyValue::new("route", "/orders"))
        .with_tag(KeyValue::new("cached", false));
    assert!(sink.export(&[record]).is_success());
    sink.shutdown(Duration::ZERO);

    let documents = parse_array(&dir.path().join("traces_trip.json"));
    assert_eq!(documents.len(), 1);
    let document = &documents[0];
    assert_eq!(document["traceId"], format!("{:032x}", 42_u128));
    assert_eq!(document["spanId"], format!("{:016x}", 42_u64));
    assert_eq!(document["parentSpanId"], "0000000000000099");

    let tags: Vec<(&str, &Value)> = document["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|kv| (kv["key"].as_str().unwrap(), &kv["value"]))
        .collect();
    assert_eq!(tags.len(), 3);
    assert_eq!(tags[0], ("index", &serde_json::json!({ "intValue": "41" })));
    assert_eq!(tags[1], ("route", &serde_json::json!({ "stringValue": "/orders" })));
    assert_eq!(tags[2], ("cached", &serde_json::json!({ "boolValue": false })));
}
