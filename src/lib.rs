//! Telemetry File Sink: rotating JSON files for traces, logs and metrics.
//!
//! Each telemetry kind gets its own [`FileSink`], which appends finished
//! records to `{kind}_{runId}.json`, rotating to a new file when the size
//! limit would be exceeded or the UTC date changes. Every file is a valid
//! JSON array once closed, with one record per line.

#![allow(clippy::multiple_crate_versions)]

//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │  Adapters (observability/)                          │  ← tracing / OpenTelemetry
//! │  - FileSpanExporter, FileLogLayer, init_telemetry   │
//! └─────────────────────────────────────────────────────┘
//!                        │
//! ┌─────────────────────────────────────────────────────┐
//! │  Records (records/)                                 │  ← record → JSON document
//! │  - SpanRecord, LogRecord, MetricPoint               │
//! └─────────────────────────────────────────────────────┘
//!                        │
//! ┌─────────────────────────────────────────────────────┐
//! │  Sink (sink/)                                       │  ← rotation + file I/O
//! │  - FileSink<R>, rotation decision, OpenFile         │
//! └─────────────────────────────────────────────────────┘
//!                        │
//! ┌─────────────────────────────────────────────────────┐
//! │  Infrastructure & Domain Layers                     │
//! │  - Default directory, file naming (infrastructure/) │
//! │  - Error types (domain/error)                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`domain`]: error type and result alias
//! - [`infrastructure`]: default output directory and file naming
//! - [`records`]: telemetry records and their JSON documents
//! - [`sink`]: the generic rotating file sink
//! - [`observability`]: span exporter, log layer and subscriber setup
//!
//! # Configuration
//!
//! [`TelemetryConfig`] is read from a TOML file or a flat string map:
//!
//! ```toml
//! directory = "/var/tmp/telemetry"
//! max_file_size_bytes = 10485760
//! run_id = "nightly"
//! log_level = "debug"
//! service_name = "checkout"
//! enable_metrics = false
//! ```
//!
//! # Example
//!
//! ```no_run
//! use telemetry_file_sink::records::{MetricPoint, MetricValue};
//! use telemetry_file_sink::{init_telemetry, TelemetryConfig};
//!
//! let mut guard = init_telemetry(&TelemetryConfig::default())?;
//!
//! let span = tracing::info_span!("checkout", order = 17_i64);
//! span.in_scope(|| tracing::info!("payment accepted"));
//!
//! let now = chrono::Utc::now();
//! let _ = guard.export_metrics(&[MetricPoint::new("orders", MetricValue::LongSum(1), now, now)]);
//!
//! guard.shutdown();
//! # Ok::<(), telemetry_file_sink::SinkError>(())
//! ```

pub mod domain;
pub mod infrastructure;
pub mod observability;
pub mod records;
pub mod sink;

pub use domain::{Result, SinkError};
pub use observability::{init_telemetry, FileLogLayer, FileSpanExporter, TelemetryGuard};
pub use records::{LogRecord, MetricPoint, RecordKind, SpanRecord, TelemetryRecord};
pub use sink::{ExportResult, FileSink, SinkOptions};

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Telemetry configuration for [`init_telemetry`].
///
/// Every field has a default, so an empty TOML document or map is valid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Output directory. Default: the platform data directory, see
    /// [`infrastructure::default_telemetry_dir`].
    pub directory: Option<PathBuf>,

    /// Size limit per file. Default: 25 MiB.
    pub max_file_size_bytes: u64,

    /// Identifier embedded in every file name. Default: process start time.
    pub run_id: Option<String>,

    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    ///
    /// Options: `trace`, `debug`, `info`, `warn`, `error`, or any filter
    /// directive. Default: `"info"`
    pub log_level: Option<String>,

    /// `service.name` resource attribute.
    pub service_name: String,

    /// `service.version` resource attribute. Default: this crate's version.
    pub service_version: String,

    pub enable_traces: bool,
    pub enable_logs: bool,
    pub enable_metrics: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_file_size_bytes: sink::DEFAULT_MAX_FILE_SIZE_BYTES,
            run_id: None,
            log_level: None,
            service_name: "telemetry-file-sink".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            enable_traces: true,
            enable_logs: true,
            enable_metrics: true,
        }
    }
}

impl TelemetryConfig {
    /// Parses configuration from a flat string map.
    ///
    /// Values that do not parse fall back to their defaults.
    ///
    /// # Parsing Rules
    ///
    /// - `directory`: path, ignored when empty
    /// - `max_file_size_bytes`: `u64`; `max_file_size_mb` is accepted too and
    ///   loses to `max_file_size_bytes` when both are set
    /// - `run_id`, `log_level`: strings, ignored when empty
    /// - `service_name`, `service_version`: strings
    /// - `enable_traces`, `enable_logs`, `enable_metrics`: `true`/`false`/`1`/`0`
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::collections::BTreeMap;
    /// use telemetry_file_sink::TelemetryConfig;
    ///
    /// let mut map = BTreeMap::new();
    /// map.insert("max_file_size_mb".to_string(), "5".to_string());
    /// map.insert("enable_logs".to_string(), "false".to_string());
    ///
    /// let config = TelemetryConfig::from_map(&map);
    /// assert_eq!(config.max_file_size_bytes, 5 * 1024 * 1024);
    /// assert!(!config.enable_logs);
    /// ```
    #[must_use]
    pub fn from_map(config: &BTreeMap<String, String>) -> Self {
        let defaults = Self::default();

        let non_empty = |key: &str| {
            config
                .get(key)
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        let flag = |key: &str, default: bool| {
            config.get(key).and_then(|s| parse_flag(s)).unwrap_or(default)
        };

        let max_file_size_bytes = config
            .get("max_file_size_bytes")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .or_else(|| {
                config
                    .get("max_file_size_mb")
                    .and_then(|s| s.trim().parse::<u64>().ok())
                    .map(|mb| mb.saturating_mul(1024 * 1024))
            })
            .unwrap_or(defaults.max_file_size_bytes);

        Self {
            directory: non_empty("directory").map(PathBuf::from),
            max_file_size_bytes,
            run_id: non_empty("run_id"),
            log_level: non_empty("log_level"),
            service_name: non_empty("service_name").unwrap_or(defaults.service_name),
            service_version: non_empty("service_version").unwrap_or(defaults.service_version),
            enable_traces: flag("enable_traces", defaults.enable_traces),
            enable_logs: flag("enable_logs", defaults.enable_logs),
            enable_metrics: flag("enable_metrics", defaults.enable_metrics),
        }
    }

    /// Parses configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] if the document is not valid TOML or
    /// contains unknown keys or mistyped values.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| SinkError::Config(format!("invalid telemetry config: {e}")))
    }

    /// Reads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SinkError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Resolves defaults into the options shared by the three sinks.
    #[must_use]
    pub fn sink_options(&self) -> SinkOptions {
        let mut options = SinkOptions::default().with_max_file_size_bytes(self.max_file_size_bytes);
        if let Some(directory) = &self.directory {
            options.directory.clone_from(directory);
        }
        if let Some(run_id) = &self.run_id {
            options.run_id.clone_from(run_id);
        }
        options
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_map_defaults_on_garbage() {
        let mut map = BTreeMap::new();
        map.insert("max_file_size_bytes".to_string(), "lots".to_string());
        map.insert("enable_traces".to_string(), "maybe".to_string());
        map.insert("run_id".to_string(), "  ".to_string());

        let config = TelemetryConfig::from_map(&map);
        assert_eq!(config, TelemetryConfig::default());
    }

    #[test]
    fn test_from_map_bytes_win_over_megabytes() {
        let mut map = BTreeMap::new();
        map.insert("max_file_size_bytes".to_string(), "1000".to_string());
        map.insert("max_file_size_mb".to_string(), "3".to_string());
        map.insert("directory".to_string(), "/tmp/t".to_string());
        map.insert("enable_metrics".to_string(), "0".to_string());

        let config = TelemetryConfig::from_map(&map);
        assert_eq!(config.max_file_size_bytes, 1000);
        assert_eq!(config.directory, Some(PathBuf::from("/tmp/t")));
        assert!(!config.enable_metrics);
    }

    #[test]
    fn test_from_toml_str() {
        let config = TelemetryConfig::from_toml_str(
            r#"
            directory = "/var/tmp/telemetry"
            max_file_size_bytes = 4096
            run_id = "nightly"
            enable_logs = false
            "#,
        )
        .unwrap();

        assert_eq!(config.directory, Some(PathBuf::from("/var/tmp/telemetry")));
        assert_eq!(config.max_file_size_bytes, 4096);
        assert!(!config.enable_logs);
        assert!(config.enable_traces);
        assert_eq!(config.service_name, "telemetry-file-sink");

        let options = config.sink_options();
        assert_eq!(options.run_id, "nightly");
        assert_eq!(options.directory, PathBuf::from("/var/tmp/telemetry"));
    }

    #[test]
    fn test_from_toml_str_rejects_unknown_keys() {
        let result = TelemetryConfig::from_toml_str("max_file_size = 3");
        assert!(matches!(result, Err(SinkError::Config(_))));
    }

    #[test]
    fn test_from_file_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = TelemetryConfig::from_file(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(SinkError::Config(_))));
    }

    #[test]
    fn test_sink_options_defaults() {
        let options = TelemetryConfig::default().sink_options();
        assert_eq!(options, SinkOptions::default());
    }
}
