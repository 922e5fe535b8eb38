//! OpenTelemetry span exporter backed by a [`FileSink`].
//!
//! Finished spans arrive from the SDK as [`SpanData`], are converted into
//! [`SpanRecord`]s and appended to the rotating `traces_*.json` files.

use crate::records::{SpanEventRecord, SpanLinkRecord, SpanRecord};
use crate::sink::{ExportResult, FileSink};
use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use opentelemetry::trace::TraceError;
use opentelemetry_sdk::export::trace::{ExportResult as SpanExportResult, SpanData, SpanExporter};
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace::TracerProvider;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// File-based OpenTelemetry span exporter.
///
/// The sink is shared: the exporter is moved into the tracer provider while
/// the caller keeps a handle for diagnostics and shutdown.
pub struct FileSpanExporter {
    sink: Arc<FileSink<SpanRecord>>,
    /// Set once the SDK shuts the exporter down; later batches are refused.
    is_shutdown: AtomicBool,
}

impl FileSpanExporter {
    /// Creates a new file-based span exporter.
    ///
    /// # Parameters
    ///
    /// * `sink` - Traces sink; the caller may keep a clone to shut it down
    #[must_use]
    pub const fn new(sink: Arc<FileSink<SpanRecord>>) -> Self {
        Self {
            sink,
            is_shutdown: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn sink(&self) -> &Arc<FileSink<SpanRecord>> {
        &self.sink
    }
}

impl SpanExporter for FileSpanExporter {
    /// Writes the batch to the current traces file.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if every span was written
    /// - `Err(TraceError)` if the exporter is shut down or the sink failed
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, SpanExportResult> {
        if self.is_shutdown.load(Ordering::SeqCst) {
            return Box::pin(std::future::ready(Err(TraceError::from(
                "exporter is shut down",
            ))));
        }

        let records: Vec<SpanRecord> = batch.iter().map(span_record_from).collect();

        match self.sink.export(&records) {
            ExportResult::Success => Box::pin(std::future::ready(Ok(()))),
            ExportResult::Failure => Box::pin(std::future::ready(Err(TraceError::from(
                "failed to write spans to telemetry file",
            )))),
        }
    }

    /// Refuses further batches and closes the current file.
    fn shutdown(&mut self) {
        self.is_shutdown.store(true, Ordering::SeqCst);
        self.sink.shutdown(Duration::from_secs(5));
    }

    /// The sink was built with the provider's resource; nothing to update.
    fn set_resource(&mut self, res: &Resource) {
        let _ = res;
    }
}

impl std::fmt::Debug for FileSpanExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSpanExporter")
            .field("sink", &self.sink)
            .field("is_shutdown", &self.is_shutdown)
            .finish()
    }
}

/// Converts a finished SDK span into the sink's record.
///
/// The instrumentation library name becomes the record's scope. System
/// times are converted to UTC; attributes, events and links are copied in
/// their recorded order.
///
/// # Parameters
///
/// * `span` - Finished span as delivered by the SDK
///
/// # Returns
///
/// A [`SpanRecord`] carrying the span's ids, timing, status and tags.
#[must_use]
pub fn span_record_from(span: &SpanData) -> SpanRecord {
    SpanRecord {
        trace_id: span.span_context.trace_id(),
        span_id: span.span_context.span_id(),
        parent_span_id: span.parent_span_id,
        name: span.name.to_string(),
        kind: span.span_kind.clone(),
        status: span.status.clone(),
        start_time: DateTime::<Utc>::from(span.start_time),
        end_time: DateTime::<Utc>::from(span.end_time),
        tags: span.attributes.clone(),
        events: span
            .events
            .iter()
            .map(|event| SpanEventRecord {
                name: event.name.to_string(),
                timestamp: DateTime::<Utc>::from(event.timestamp),
                attributes: event.attributes.clone(),
            })
            .collect(),
        links: span
            .links
            .iter()
            .map(|link| SpanLinkRecord {
                trace_id: link.span_context.trace_id(),
                span_id: link.span_context.span_id(),
                attributes: link.attributes.clone(),
            })
            .collect(),
        scope: Some(span.instrumentation_lib.name.to_string()),
    }
}

/// Creates a tracer provider that exports every finished span immediately.
///
/// # Parameters
///
/// * `exporter` - File exporter the provider takes ownership of
/// * `resource` - Service metadata attached to the provider's spans
///
/// # Returns
///
/// A provider using a simple (synchronous) span processor.
///
/// # Example
///
/// ```no_run
/// use opentelemetry::KeyValue;
/// use opentelemetry_sdk::resource::Resource;
/// use std::sync::Arc;
/// use telemetry_file_sink::observability::{create_tracer_provider, FileSpanExporter};
/// use telemetry_file_sink::sink::{FileSink, SinkOptions};
///
/// let resource = Resource::new(vec![KeyValue::new("service.name", "myapp")]);
/// let sink = Arc::new(FileSink::new(
///     SinkOptions::for_directory("/tmp/telemetry"),
///     Some(resource.clone()),
/// )?);
/// let provider = create_tracer_provider(FileSpanExporter::new(sink), resource);
/// # Ok::<(), telemetry_file_sink::SinkError>(())
/// ```
pub fn create_tracer_provider(exporter: FileSpanExporter, resource: Resource) -> TracerProvider {
    TracerProvider::builder()
        .with_config(opentelemetry_sdk::trace::Config::default().with_resource(resource))
        .with_simple_exporter(exporter)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkOptions;
    use opentelemetry::trace::{Span, Tracer, TracerProvider as _};
    use opentelemetry::KeyValue;
    use tempfile::TempDir;

    #[test]
    fn test_provider_writes_finished_spans() {
        let dir = TempDir::new().unwrap();
        let resource = Resource::new(vec![KeyValue::new("service.name", "unit")]);
        let sink = Arc::new(
            FileSink::new(
                SinkOptions::for_directory(dir.path()).with_run_id("tracer"),
                Some(resource.clone()),
            )
            .unwrap(),
        );
        let provider = create_tracer_provider(FileSpanExporter::new(Arc::clone(&sink)), resource);

        let tracer = provider.tracer("unit-tests");
        let mut span = tracer.start("work");
        span.set_attribute(KeyValue::new("items", 3_i64));
        span.end();

        sink.shutdown(Duration::ZERO);

        let contents = std::fs::read_to_string(dir.path().join("traces_tracer.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        let spans = parsed.as_array().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0]["name"], "work");
        assert_eq!(spans[0]["parentSpanId"], "");
        assert_eq!(spans[0]["scope"], "unit-tests");
        assert_eq!(spans[0]["tags"][0]["key"], "items");
        assert_eq!(spans[0]["resource"][0]["value"]["stringValue"], "unit");
    }

    #[test]
    fn test_export_after_shutdown_is_refused() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(FileSink::new(SinkOptions::for_directory(dir.path()), None).unwrap());
        let mut exporter = FileSpanExporter::new(sink);

        exporter.shutdown();
        let result = futures_util::FutureExt::now_or_never(exporter.export(Vec::new()));

        assert!(matches!(result, Some(Err(_))));
    }
}
