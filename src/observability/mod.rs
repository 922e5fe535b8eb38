//! Adapters connecting the sinks to `tracing` and OpenTelemetry.
//!
//! # Architecture
//!
//! ```text
//! tracing spans  → tracing-opentelemetry → SDK → FileSpanExporter → traces_*.json
//! tracing events → FileLogLayer                                    → logs_*.json
//! MetricPoint    → TelemetryGuard::export_metrics                  → metrics_*.json
//! ```
//!
//! # Configuration
//!
//! Log level is controlled via:
//! 1. `RUST_LOG` environment variable (highest priority)
//! 2. `log_level` in [`TelemetryConfig`](crate::TelemetryConfig)
//! 3. Default: `"info"`
//!
//! # Modules
//!
//! - [`init`]: subscriber setup and the [`TelemetryGuard`]
//! - [`tracer`]: span exporter and tracer provider
//! - [`log_layer`]: `tracing` layer producing log records

pub mod init;
pub mod log_layer;
pub mod tracer;

pub use init::{build_resource, init_telemetry, TelemetryGuard, INTERNAL_TARGET};
pub use log_layer::FileLogLayer;
pub use tracer::{create_tracer_provider, span_record_from, FileSpanExporter};
