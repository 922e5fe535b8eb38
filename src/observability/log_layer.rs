//! `tracing` layer that writes every event as a [`LogRecord`].
//!
//! Fields recorded on enclosing spans are kept in the span's extensions and
//! attached to each event as scope attributes, outermost span first. When
//! the OpenTelemetry layer is installed too, the event inherits the trace
//! and span id of the innermost span.
//!
//! A few field names follow the OpenTelemetry semantic conventions and are
//! lifted out of the attribute list:
//!
//! | field                  | becomes                      |
//! |------------------------|------------------------------|
//! | `message`              | body                         |
//! | `event.id`, `event.name` | event id                   |
//! | `exception.type`       | exception type               |
//! | `exception.message`    | exception message            |
//! | `exception.stacktrace` | exception stack trace        |
//!
//! A field recorded as `&dyn Error` (`error = &err as &dyn Error`) also
//! fills the exception, with the source chain as stack trace.

use crate::records::{EventId, ExceptionInfo, LogRecord, Severity};
use crate::sink::FileSink;
use chrono::Utc;
use opentelemetry::trace::{SpanId, TraceContextExt, TraceFlags, TraceId};
use opentelemetry::{KeyValue, Value};
use std::cell::Cell;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_opentelemetry::OtelData;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

thread_local! {
    /// Set while this thread is inside the sink, so events the sink emits
    /// about itself are not fed back into it.
    static EXPORTING: Cell<bool> = const { Cell::new(false) };
}

/// Span fields kept in the span's extensions.
#[derive(Debug, Clone, Default)]
struct ScopeFields(Vec<KeyValue>);

impl ScopeFields {
    fn merge(&mut self, fields: Vec<KeyValue>) {
        for field in fields {
            if let Some(existing) = self.0.iter_mut().find(|kv| kv.key == field.key) {
                existing.value = field.value;
            } else {
                self.0.push(field);
            }
        }
    }
}

/// Layer exporting `tracing` events to a log sink, one record per event.
///
/// Once installed globally the layer lives as long as the dispatcher, so it
/// cannot be dropped to stop it. Shutting it down goes through the shared
/// flag returned by [`FileLogLayer::shutdown_handle`].
pub struct FileLogLayer {
    sink: Arc<FileSink<LogRecord>>,
    /// Set once telemetry shuts down; later events are ignored.
    is_shutdown: Arc<AtomicBool>,
}

impl FileLogLayer {
    /// Creates a layer writing into `sink`.
    ///
    /// # Parameters
    ///
    /// * `sink` - Log sink shared with the owner that shuts it down
    #[must_use]
    pub fn new(sink: Arc<FileSink<LogRecord>>) -> Self {
        Self {
            sink,
            is_shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub const fn sink(&self) -> &Arc<FileSink<LogRecord>> {
        &self.sink
    }

    /// Returns the flag that stops this layer.
    ///
    /// Storing `true` makes every later event a no-op, so a closed sink is
    /// never reopened by a stray event.
    ///
    /// # Returns
    ///
    /// A handle to the same flag the layer checks on every event.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.is_shutdown)
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for FileLogLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLogLayer")
            .field("sink", &self.sink)
            .field("is_shutdown", &self.is_shutdown)
            .finish()
    }
}

impl<S> Layer<S> for FileLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut()
            .insert(ScopeFields(visitor.into_scope_fields()));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);
        let fields = visitor.into_scope_fields();

        let mut extensions = span.extensions_mut();
        if let Some(scope) = extensions.get_mut::<ScopeFields>() {
            scope.merge(fields);
        } else {
            extensions.insert(ScopeFields(fields));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if self.is_shutdown() || EXPORTING.with(Cell::get) {
            return;
        }

        let record = build_record(event, &ctx);

        EXPORTING.with(|flag| flag.set(true));
        // Failures are already logged by the sink; there is no caller to
        // report them to.
        let _ = self.sink.export(std::slice::from_ref(&record));
        EXPORTING.with(|flag| flag.set(false));
    }
}

fn build_record<S>(event: &Event<'_>, ctx: &Context<'_, S>) -> LogRecord
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let metadata = event.metadata();
    let mut visitor = FieldVisitor::default();
    event.record(&mut visitor);

    let severity = Severity::from(*metadata.level());
    let formatted = formatted_message(visitor.message.as_deref(), &visitor.attributes);

    let mut record = LogRecord::new(Utc::now(), metadata.target()).with_severity(severity);
    record.body = visitor.message;
    record.formatted_message = Some(formatted);
    record.attributes = visitor.attributes;
    record.event_id = visitor.event_id.map(|id| EventId {
        id,
        name: visitor.event_name,
    });
    record.exception = visitor.exception;

    if let Some(scope) = ctx.event_scope(event) {
        for span in scope.from_root() {
            if let Some(fields) = span.extensions().get::<ScopeFields>() {
                if !fields.0.is_empty() {
                    record.scopes.push(fields.0.clone());
                }
            }
        }
    }

    if let Some(span) = ctx.event_span(event) {
        if let Some((trace_id, span_id, flags)) = span.extensions().get::<OtelData>().and_then(span_context_of) {
            record = record.with_span_context(trace_id, span_id, flags);
        }
    }

    record
}

/// Trace and span id of a span tracked by the OpenTelemetry layer.
///
/// A root span has no trace id on its builder until it is started; its
/// trace id then comes from the parent context, and its flags default to
/// unsampled.
fn span_context_of(data: &OtelData) -> Option<(TraceId, SpanId, TraceFlags)> {
    let span_id = data.builder.span_id?;
    let parent = data.parent_cx.span();
    let parent_context = parent.span_context();

    let trace_id = data
        .builder
        .trace_id
        .or_else(|| parent_context.is_valid().then(|| parent_context.trace_id()))?;
    let flags = if parent_context.is_valid() {
        parent_context.trace_flags()
    } else {
        TraceFlags::default()
    };

    Some((trace_id, span_id, flags))
}

/// Message followed by the remaining fields, as a console formatter prints them.
fn formatted_message(message: Option<&str>, attributes: &[KeyValue]) -> String {
    let mut formatted = message.unwrap_or_default().to_string();
    for attribute in attributes {
        if !formatted.is_empty() {
            formatted.push(' ');
        }
        let _ = write!(formatted, "{}={}", attribute.key, attribute.value);
    }
    formatted
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    attributes: Vec<KeyValue>,
    event_id: Option<i64>,
    event_name: Option<String>,
    exception: Option<ExceptionInfo>,
}

impl FieldVisitor {
    fn exception_mut(&mut self) -> &mut ExceptionInfo {
        self.exception.get_or_insert_with(|| ExceptionInfo {
            type_name: None,
            message: String::new(),
            stack_trace: None,
        })
    }

    fn push(&mut self, field: &Field, value: Value) {
        match field.name() {
            "message" => self.message = Some(value.as_str().into_owned()),
            "event.id" => match value {
                Value::I64(id) => self.event_id = Some(id),
                other => self.attributes.push(KeyValue::new(field.name(), other)),
            },
            "event.name" => self.event_name = Some(value.as_str().into_owned()),
            "exception.type" => self.exception_mut().type_name = Some(value.as_str().into_owned()),
            "exception.message" => self.exception_mut().message = value.as_str().into_owned(),
            "exception.stacktrace" => {
                self.exception_mut().stack_trace = Some(value.as_str().into_owned());
            }
            name => self.attributes.push(KeyValue::new(name, value)),
        }
    }

    /// Span fields carry no special meaning; everything stays an attribute.
    fn into_scope_fields(self) -> Vec<KeyValue> {
        let mut fields = self.attributes;
        if let Some(message) = self.message {
            fields.insert(0, KeyValue::new("message", message));
        }
        if let Some(id) = self.event_id {
            fields.push(KeyValue::new("event.id", id));
        }
        if let Some(name) = self.event_name {
            fields.push(KeyValue::new("event.name", name));
        }
        fields
    }
}

impl Visit for FieldVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, Value::F64(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, Value::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        let value = i64::try_from(value).map_or_else(|_| Value::from(value.to_string()), Value::I64);
        self.push(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, Value::Bool(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, Value::from(value.to_string()));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let mut chain = Vec::new();
        let mut source = value.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        let exception = self.exception_mut();
        exception.message = value.to_string();
        if !chain.is_empty() {
            exception.stack_trace = Some(chain.join("\n"));
        }

        self.attributes
            .push(KeyValue::new(field.name(), value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.push(field, Value::from(format!("{value:?}")));
    }
}
