//! Subscriber setup wiring the three sinks into a global `tracing` pipeline.

use super::log_layer::FileLogLayer;
use super::tracer::{create_tracer_provider, FileSpanExporter};
use crate::domain::Result;
use crate::records::{LogRecord, MetricPoint, SpanRecord};
use crate::sink::{ExportResult, FileSink, SinkOptions};
use crate::TelemetryConfig;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace::TracerProvider;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::Metadata;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log target prefix of this crate's own diagnostics.
pub const INTERNAL_TARGET: &str = env!("CARGO_CRATE_NAME");

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Keeps the sinks and the tracer provider alive.
///
/// Dropping the guard (or calling [`TelemetryGuard::shutdown`]) flushes the
/// provider and closes every open file.
pub struct TelemetryGuard {
    options: SinkOptions,
    provider: Option<TracerProvider>,
    traces: Option<Arc<FileSink<SpanRecord>>>,
    logs: Option<Arc<FileSink<LogRecord>>>,
    metrics: Option<Arc<FileSink<MetricPoint>>>,
    /// Stops the global log layer, which outlives the guard.
    log_layer_shutdown: Option<Arc<AtomicBool>>,
    is_shutdown: bool,
}

impl TelemetryGuard {
    /// Options shared by the three sinks.
    #[must_use]
    pub const fn options(&self) -> &SinkOptions {
        &self.options
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.options.run_id
    }

    #[must_use]
    pub fn directory(&self) -> &PathBuf {
        &self.options.directory
    }

    #[must_use]
    pub const fn traces(&self) -> Option<&Arc<FileSink<SpanRecord>>> {
        self.traces.as_ref()
    }

    #[must_use]
    pub const fn logs(&self) -> Option<&Arc<FileSink<LogRecord>>> {
        self.logs.as_ref()
    }

    #[must_use]
    pub const fn metrics(&self) -> Option<&Arc<FileSink<MetricPoint>>> {
        self.metrics.as_ref()
    }

    /// Exports metric points into the metrics sink.
    ///
    /// # Parameters
    ///
    /// * `points` - Metric points to append, in order
    ///
    /// # Returns
    ///
    /// The sink's result, or `ExportResult::Success` when metrics are
    /// disabled.
    pub fn export_metrics(&self, points: &[MetricPoint]) -> ExportResult {
        self.metrics
            .as_ref()
            .map_or(ExportResult::Success, |sink| sink.export(points))
    }

    /// Shuts the provider down and closes every sink. Idempotent.
    ///
    /// The log layer is stopped first: the global dispatcher keeps it alive,
    /// and an event arriving after the close would otherwise reopen the logs
    /// sink into a file nobody closes.
    pub fn shutdown(&mut self) {
        if self.is_shutdown {
            return;
        }
        self.is_shutdown = true;

        if let Some(flag) = &self.log_layer_shutdown {
            flag.store(true, Ordering::SeqCst);
        }

        if let Some(provider) = self.provider.take() {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "tracer provider shutdown failed");
            }
        }
        if let Some(sink) = &self.traces {
            sink.shutdown(SHUTDOWN_TIMEOUT);
        }
        if let Some(sink) = &self.logs {
            sink.shutdown(SHUTDOWN_TIMEOUT);
        }
        if let Some(sink) = &self.metrics {
            sink.shutdown(SHUTDOWN_TIMEOUT);
        }

        tracing::debug!(run_id = %self.options.run_id, "telemetry shut down");
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TelemetryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryGuard")
            .field("options", &self.options)
            .field("traces", &self.traces.is_some())
            .field("logs", &self.logs.is_some())
            .field("metrics", &self.metrics.is_some())
            .field("is_shutdown", &self.is_shutdown)
            .finish_non_exhaustive()
    }
}

/// Target prefix of the OpenTelemetry crates' internal logs.
const OPENTELEMETRY_TARGET: &str = "opentelemetry";

/// Whether an event or span is application telemetry rather than a
/// diagnostic of this crate or the OpenTelemetry SDK.
fn is_external(metadata: &Metadata<'_>) -> bool {
    let target = metadata.target();
    !target.starts_with(INTERNAL_TARGET) && !target.starts_with(OPENTELEMETRY_TARGET)
}

/// Resource attached to every record of this process.
#[must_use]
pub fn build_resource(config: &TelemetryConfig, run_id: &str) -> Resource {
    Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", config.service_version.clone()),
        KeyValue::new("service.instance.id", run_id.to_string()),
    ])
}

/// Installs the global subscriber and returns the guard owning the sinks.
///
/// # Parameters
///
/// * `config` - Directory, run id, service identity and enabled kinds
///
/// Sets up:
/// 1. An `EnvFilter` from `RUST_LOG`, else `config.log_level`, else `"info"`
/// 2. A `fmt` layer on stderr, where sink failures are reported
/// 3. The OpenTelemetry layer over a file-backed tracer provider
/// 4. The [`FileLogLayer`] turning events into log records
///
/// Events from this crate and from the OpenTelemetry SDK never reach the
/// file layers. If a global subscriber is already installed the sinks
/// still work, but only through direct calls.
///
/// # Errors
///
/// Returns an error if the options are invalid or the output directory
/// cannot be created.
///
/// # Example
///
/// ```no_run
/// use telemetry_file_sink::{init_telemetry, TelemetryConfig};
///
/// let mut guard = init_telemetry(&TelemetryConfig::default())?;
/// tracing::info!(user = "ada", "signed in");
/// guard.shutdown();
/// # Ok::<(), telemetry_file_sink::SinkError>(())
/// ```
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard> {
    let options = config.sink_options();
    options.validate()?;

    let resource = build_resource(config, &options.run_id);

    let traces = if config.enable_traces {
        Some(Arc::new(FileSink::new(options.clone(), Some(resource.clone()))?))
    } else {
        None
    };
    let logs = if config.enable_logs {
        Some(Arc::new(FileSink::new(options.clone(), Some(resource.clone()))?))
    } else {
        None
    };
    let metrics = if config.enable_metrics {
        Some(Arc::new(FileSink::new(options.clone(), Some(resource.clone()))?))
    } else {
        None
    };

    let provider = traces
        .as_ref()
        .map(|sink| create_tracer_provider(FileSpanExporter::new(Arc::clone(sink)), resource.clone()));

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.log_level.clone().unwrap_or_else(|| "info".to_string()))
    });

    let otel_layer = provider.as_ref().map(|provider| {
        OpenTelemetryLayer::new(provider.tracer(config.service_name.clone()))
            .with_filter(filter_fn(is_external))
    });
    let log_layer = logs.as_ref().map(|sink| FileLogLayer::new(Arc::clone(sink)));
    let log_layer_shutdown = log_layer.as_ref().map(FileLogLayer::shutdown_handle);
    let log_layer = log_layer.map(|layer| layer.with_filter(filter_fn(is_external)));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(otel_layer)
        .with(log_layer);

    if let Err(e) = subscriber.try_init() {
        tracing::warn!(error = %e, "a global subscriber is already installed");
    }

    tracing::debug!(
        directory = ?options.directory,
        run_id = %options.run_id,
        traces = traces.is_some(),
        logs = logs.is_some(),
        metrics = metrics.is_some(),
        "telemetry initialized"
    );

    Ok(TelemetryGuard {
        options,
        provider,
        traces,
        logs,
        metrics,
        log_layer_shutdown,
        is_shutdown: false,
    })
}
