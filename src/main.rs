//! Demo binary exercising all three telemetry kinds.
//!
//! Usage: `telemetry-demo [config.toml]`
//!
//! Runs a short instrumented workload (a sequential phase, then a parallel
//! phase on worker threads), exports two metric points, shuts telemetry
//! down and prints the files written for the run.

use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use opentelemetry::KeyValue;
use telemetry_file_sink::records::{HistogramData, MetricPoint, MetricValue};
use telemetry_file_sink::{init_telemetry, Result, TelemetryConfig};

const WORKERS: usize = 4;
const ITEMS_PER_WORKER: u64 = 5;

/// Histogram bounds for item durations, in milliseconds.
const DURATION_BOUNDS_MS: &[f64] = &[1.0, 2.0, 5.0, 10.0, 25.0];

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("telemetry-demo: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => TelemetryConfig::from_file(path)?,
        None => TelemetryConfig {
            service_name: "telemetry-demo".to_string(),
            ..TelemetryConfig::default()
        },
    };

    let mut guard = init_telemetry(&config)?;
    let started = Utc::now();

    let mut durations_ms = Vec::new();
    tracing::info_span!("demo", run_id = %guard.run_id()).in_scope(|| {
        durations_ms.extend(sequential_phase());
        durations_ms.extend(parallel_phase());
    });

    let finished = Utc::now();
    let points = [
        MetricPoint::new(
            "demo.items.processed",
            MetricValue::LongSum(i64::try_from(durations_ms.len()).unwrap_or(i64::MAX)),
            started,
            finished,
        )
        .with_description("Items processed by the demo workload")
        .with_unit("{item}"),
        MetricPoint::new(
            "demo.item.duration",
            MetricValue::Histogram(HistogramData::from_samples(DURATION_BOUNDS_MS, &durations_ms)),
            started,
            finished,
        )
        .with_description("Time spent per item")
        .with_unit("ms")
        .with_tag(KeyValue::new("workers", i64::try_from(WORKERS).unwrap_or(i64::MAX))),
    ];
    if !guard.export_metrics(&points).is_success() {
        tracing::warn!("metric export failed");
    }

    let directory = guard.directory().clone();
    let run_id = guard.run_id().to_string();
    guard.shutdown();

    list_run_files(&directory, &run_id)
}

#[tracing::instrument]
fn sequential_phase() -> Vec<f64> {
    (0..ITEMS_PER_WORKER).map(|item| process_item(0, item)).collect()
}

#[tracing::instrument]
fn parallel_phase() -> Vec<f64> {
    let phase = tracing::Span::current();
    let handles: Vec<_> = (1..=WORKERS)
        .map(|worker| {
            let parent = phase.clone();
            thread::spawn(move || {
                let _entered = tracing::info_span!(parent: &parent, "worker", worker).entered();
                (0..ITEMS_PER_WORKER)
                    .map(|item| process_item(worker, item))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut durations = Vec::new();
    for handle in handles {
        match handle.join() {
            Ok(worker_durations) => durations.extend(worker_durations),
            Err(_) => tracing::error!("worker thread panicked"),
        }
    }
    durations
}

/// Simulates one unit of work; returns its duration in milliseconds.
#[tracing::instrument]
fn process_item(worker: usize, item: u64) -> f64 {
    let started = Instant::now();
    let jitter = (item * 3 + u64::try_from(worker).unwrap_or(0)) % 7;
    thread::sleep(Duration::from_millis(1 + jitter));

    if item % 4 == 3 {
        tracing::warn!(worker, item, "item took the slow path");
    } else {
        tracing::debug!(worker, item, "item processed");
    }

    started.elapsed().as_secs_f64() * 1000.0
}

fn list_run_files(directory: &std::path::Path, run_id: &str) -> Result<()> {
    let marker = format!("_{run_id}");
    let mut files: Vec<_> = std::fs::read_dir(directory)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.contains(&marker) && name.ends_with(".json"))
        })
        .collect();
    files.sort();

    println!("telemetry written to {}:", directory.display());
    for file in files {
        let size = std::fs::metadata(&file).map(|m| m.len()).unwrap_or(0);
        println!("  {} ({size} bytes)", file.display());
    }
    Ok(())
}
