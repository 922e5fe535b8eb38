//! Finished trace spans and their JSON projection.

use super::{format_attributes, format_resource, format_timestamp, json_f64, RecordKind, TelemetryRecord};
use chrono::{DateTime, Utc};
use opentelemetry::trace::{SpanId, SpanKind, Status, TraceId};
use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use serde_json::Value as JsonValue;

/// A timed event recorded on a span.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanEventRecord {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub attributes: Vec<KeyValue>,
}

/// A link from a span to another span context.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanLinkRecord {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub attributes: Vec<KeyValue>,
}

/// A single finished traced operation.
///
/// Built either from SDK span data by
/// [`FileSpanExporter`](crate::observability::FileSpanExporter) or directly
/// with the builder methods below.
#[derive(Debug, Clone)]
pub struct SpanRecord {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    /// `SpanId::INVALID` for root spans.
    pub parent_span_id: SpanId,
    pub name: String,
    pub kind: SpanKind,
    pub status: Status,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub tags: Vec<KeyValue>,
    pub events: Vec<SpanEventRecord>,
    pub links: Vec<SpanLinkRecord>,
    /// Instrumentation scope that produced the span, if known.
    pub scope: Option<String>,
}

impl SpanRecord {
    /// Creates an internal root span with unset status and no tags.
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        name: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            parent_span_id: SpanId::INVALID,
            name: name.into(),
            kind: SpanKind::Internal,
            status: Status::Unset,
            start_time,
            end_time,
            tags: Vec::new(),
            events: Vec::new(),
            links: Vec::new(),
            scope: None,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent_span_id: SpanId) -> Self {
        self.parent_span_id = parent_span_id;
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: KeyValue) -> Self {
        self.tags.push(tag);
        self
    }

    #[must_use]
    pub fn with_event(mut self, event: SpanEventRecord) -> Self {
        self.events.push(event);
        self
    }

    #[must_use]
    pub fn with_link(mut self, link: SpanLinkRecord) -> Self {
        self.links.push(link);
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Span duration in milliseconds; spans that end before they start
    /// report zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_ms(&self) -> f64 {
        let elapsed = self.end_time.signed_duration_since(self.start_time);
        elapsed
            .num_nanoseconds()
            .map_or(elapsed.num_milliseconds() as f64, |nanos| nanos as f64 / 1_000_000.0)
            .max(0.0)
    }
}

/// Display name of a span kind as written to documents.
const fn span_kind_name(kind: &SpanKind) -> &'static str {
    match kind {
        SpanKind::Internal => "Internal",
        SpanKind::Server => "Server",
        SpanKind::Client => "Client",
        SpanKind::Producer => "Producer",
        SpanKind::Consumer => "Consumer",
    }
}

/// Splits a span status into its code name and description.
fn format_status(status: &Status) -> (&'static str, String) {
    match status {
        Status::Unset => ("Unset", String::new()),
        Status::Ok => ("Ok", String::new()),
        Status::Error { description } => ("Error", description.to_string()),
    }
}

/// Hex form of a parent span id; empty for root spans.
fn format_parent(parent: SpanId) -> String {
    if parent == SpanId::INVALID {
        String::new()
    } else {
        format!("{parent:016x}")
    }
}

impl TelemetryRecord for SpanRecord {
    const KIND: RecordKind = RecordKind::Traces;

    fn to_document(&self, resource: Option<&Resource>) -> JsonValue {
        let (status_code, status_description) = format_status(&self.status);

        let events: Vec<JsonValue> = self
            .events
            .iter()
            .map(|event| {
                serde_json::json!({
                    "name": event.name,
                    "timestamp": format_timestamp(&event.timestamp),
                    "attributes": format_attributes(&event.attributes),
                })
            })
            .collect();

        let links: Vec<JsonValue> = self
            .links
            .iter()
            .map(|link| {
                serde_json::json!({
                    "traceId": format!("{:032x}", link.trace_id),
                    "spanId": format!("{:016x}", link.span_id),
                    "attributes": format_attributes(&link.attributes),
                })
            })
            .collect();

        let mut document = serde_json::json!({
            "timestamp": format_timestamp(&self.start_time),
            "traceId": format!("{:032x}", self.trace_id),
            "spanId": format!("{:016x}", self.span_id),
            "parentSpanId": format_parent(self.parent_span_id),
            "name": self.name,
            "kind": span_kind_name(&self.kind),
            "status": {
                "code": status_code,
                "description": status_description,
            },
            "startTime": format_timestamp(&self.start_time),
            "endTime": format_timestamp(&self.end_time),
            "durationMs": json_f64(self.duration_ms()),
            "tags": format_attributes(&self.tags),
            "events": events,
            "links": links,
            "resource": format_resource(resource),
        });

        if let (Some(scope), Some(fields)) = (&self.scope, document.as_object_mut()) {
            fields.insert("scope".to_string(), JsonValue::String(scope.clone()));
        }

        document
    }
}
