//! Structured log records and their JSON projection.
//!
//! # Attribute Merging
//!
//! A log record carries its own attributes plus the attributes of every
//! enclosing scope (for `tracing` events: the fields of the spans the event
//! was emitted in). [`LogRecord::merged_attributes`] combines them:
//!
//! 1. Record attributes come first, in their original order.
//! 2. Every scope attribute follows with its key prefixed `scope.`, so a
//!    scope value never replaces or hides a record value.
//! 3. Scopes are visited outermost first; when two scopes carry the same
//!    key, the innermost value wins and keeps the position of the first
//!    occurrence.

use super::{format_attributes, format_resource, format_timestamp, RecordKind, TelemetryRecord};
use chrono::{DateTime, Utc};
use opentelemetry::trace::{SpanId, TraceFlags, TraceId};
use opentelemetry::{Key, KeyValue};
use opentelemetry_sdk::Resource;
use serde_json::Value as JsonValue;

/// Prefix applied to every scope-derived attribute key.
pub const SCOPE_KEY_PREFIX: &str = "scope.";

/// Log severity on the OpenTelemetry 1..24 severity number scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    /// OpenTelemetry severity number (the first number of each range).
    #[must_use]
    pub const fn number(self) -> u8 {
        match self {
            Self::Trace => 1,
            Self::Debug => 5,
            Self::Info => 9,
            Self::Warn => 13,
            Self::Error => 17,
            Self::Fatal => 21,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Trace => "Trace",
            Self::Debug => "Debug",
            Self::Info => "Info",
            Self::Warn => "Warn",
            Self::Error => "Error",
            Self::Fatal => "Fatal",
        }
    }
}

impl From<tracing::Level> for Severity {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Self::Trace,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            _ => Self::Error,
        }
    }
}

/// Numeric event identifier with an optional name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventId {
    pub id: i64,
    pub name: Option<String>,
}

/// Exception details attached to a log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub type_name: Option<String>,
    pub message: String,
    pub stack_trace: Option<String>,
}

/// A structured log line.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub trace_id: Option<TraceId>,
    pub span_id: Option<SpanId>,
    pub trace_flags: TraceFlags,
    /// Logger category; for `tracing` events this is the event target.
    pub category: String,
    pub severity: Option<Severity>,
    pub severity_text: Option<String>,
    pub body: Option<String>,
    pub formatted_message: Option<String>,
    pub attributes: Vec<KeyValue>,
    /// Attributes of enclosing scopes, outermost first.
    pub scopes: Vec<Vec<KeyValue>>,
    pub event_id: Option<EventId>,
    pub exception: Option<ExceptionInfo>,
}

impl LogRecord {
    /// Creates a record with only a timestamp and category set.
    pub fn new(timestamp: DateTime<Utc>, category: impl Into<String>) -> Self {
        Self {
            timestamp,
            trace_id: None,
            span_id: None,
            trace_flags: TraceFlags::default(),
            category: category.into(),
            severity: None,
            severity_text: None,
            body: None,
            formatted_message: None,
            attributes: Vec::new(),
            scopes: Vec::new(),
            event_id: None,
            exception: None,
        }
    }

    /// Sets severity and the matching severity text.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self.severity_text = Some(severity.name().to_string());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: KeyValue) -> Self {
        self.attributes.push(attribute);
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: Vec<KeyValue>) -> Self {
        self.scopes.push(scope);
        self
    }

    #[must_use]
    pub fn with_span_context(mut self, trace_id: TraceId, span_id: SpanId, flags: TraceFlags) -> Self {
        self.trace_id = Some(trace_id);
        self.span_id = Some(span_id);
        self.trace_flags = flags;
        self
    }

    /// Record attributes followed by prefixed scope attributes.
    ///
    /// See the module documentation for the exact policy.
    #[must_use]
    pub fn merged_attributes(&self) -> Vec<KeyValue> {
        let mut scoped: Vec<KeyValue> = Vec::new();
        for scope in &self.scopes {
            for attribute in scope {
                let key = Key::new(format!("{SCOPE_KEY_PREFIX}{}", attribute.key.as_str()));
                if let Some(existing) = scoped.iter_mut().find(|kv| kv.key == key) {
                    existing.value = attribute.value.clone();
                } else {
                    scoped.push(KeyValue::new(key, attribute.value.clone()));
                }
            }
        }

        let mut merged = self.attributes.clone();
        merged.extend(scoped);
        merged
    }
}

fn format_trace_id(trace_id: Option<TraceId>) -> String {
    trace_id
        .filter(|id| *id != TraceId::INVALID)
        .map_or_else(String::new, |id| format!("{id:032x}"))
}

fn format_span_id(span_id: Option<SpanId>) -> String {
    span_id
        .filter(|id| *id != SpanId::INVALID)
        .map_or_else(String::new, |id| format!("{id:016x}"))
}

impl TelemetryRecord for LogRecord {
    const KIND: RecordKind = RecordKind::Logs;

    fn to_document(&self, resource: Option<&Resource>) -> JsonValue {
        let severity = self.severity.map_or(JsonValue::Null, |severity| {
            serde_json::json!({
                "number": severity.number(),
                "name": severity.name(),
            })
        });

        let mut document = serde_json::json!({
            "timestamp": format_timestamp(&self.timestamp),
            "traceId": format_trace_id(self.trace_id),
            "spanId": format_span_id(self.span_id),
            "traceFlags": format!("{:02x}", self.trace_flags.to_u8()),
            "categoryName": self.category,
            "severity": severity,
            "severityText": self.severity_text,
            "body": self.body,
            "formattedMessage": self.formatted_message,
            "attributes": format_attributes(&self.merged_attributes()),
            "resource": format_resource(resource),
        });

        let Some(fields) = document.as_object_mut() else {
            return document;
        };

        if let Some(event_id) = self.event_id.as_ref().filter(|event| event.id != 0) {
            fields.insert(
                "eventId".to_string(),
                serde_json::json!({ "id": event_id.id, "name": event_id.name }),
            );
        }

        if let Some(exception) = &self.exception {
            fields.insert(
                "exception".to_string(),
                serde_json::json!({
                    "type": exception.type_name,
                    "message": exception.message,
                    "stackTrace": exception.stack_trace,
                }),
            );
        }

        document
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_record() -> LogRecord {
        LogRecord::new(Utc.with_ymd_and_hms(2026, 2, 3, 4, 5, 6).unwrap(), "demo::worker")
    }

    fn keys(attributes: &[KeyValue]) -> Vec<String> {
        attributes.iter().map(|kv| kv.key.as_str().to_string()).collect()
    }

    #[test]
    fn test_scope_keys_are_prefixed_and_never_override_record() {
        let record = base_record()
            .with_attribute(KeyValue::new("user", "record-user"))
            .with_scope(vec![KeyValue::new("user", "scope-user"), KeyValue::new("request", 7_i64)]);

        let merged = record.merged_attributes();
        assert_eq!(keys(&merged), vec!["user", "scope.user", "scope.request"]);
        assert_eq!(merged[0].value.as_str(), "record-user");
        assert_eq!(merged[1].value.as_str(), "scope-user");
    }

    #[test]
    fn test_inner_scope_wins_on_shared_key() {
        let record = base_record()
            .with_scope(vec![KeyValue::new("stage", "outer"), KeyValue::new("a", 1_i64)])
            .with_scope(vec![KeyValue::new("b", 2_i64), KeyValue::new("stage", "inner")]);

        let merged = record.merged_attributes();
        assert_eq!(keys(&merged), vec!["scope.stage", "scope.a", "scope.b"]);
        assert_eq!(merged[0].value.as_str(), "inner");
    }

    #[test]
    fn test_log_document_fields() {
        let mut record = base_record()
            .with_severity(Severity::Warn)
            .with_body("disk almost full")
            .with_span_context(TraceId::from(1), SpanId::from(2), TraceFlags::SAMPLED);
        record.event_id = Some(EventId { id: 42, name: Some("DiskSpace".to_string()) });

        let doc = record.to_document(None);
        assert_eq!(doc["traceId"], format!("{:032x}", 1_u128));
        assert_eq!(doc["spanId"], "0000000000000002");
        assert_eq!(doc["traceFlags"], "01");
        assert_eq!(doc["categoryName"], "demo::worker");
        assert_eq!(doc["severity"]["number"], 13);
        assert_eq!(doc["severityText"], "Warn");
        assert_eq!(doc["body"], "disk almost full");
        assert_eq!(doc["eventId"]["id"], 42);
        assert!(doc.get("exception").is_none());
    }

    #[test]
    fn test_zero_event_id_and_missing_context_are_omitted() {
        let mut record = base_record();
        record.event_id = Some(EventId { id: 0, name: None });
        record.exception = Some(ExceptionInfo {
            type_name: Some("io".to_string()),
            message: "denied".to_string(),
            stack_trace: None,
        });

        let doc = record.to_document(None);
        assert!(doc.get("eventId").is_none());
        assert_eq!(doc["traceId"], "");
        assert_eq!(doc["severity"], JsonValue::Null);
        assert_eq!(doc["exception"]["message"], "denied");
        assert_eq!(doc["exception"]["stackTrace"], JsonValue::Null);
    }

    #[test]
    fn test_severity_from_tracing_level() {
        assert_eq!(Severity::from(tracing::Level::ERROR), Severity::Error);
        assert_eq!(Severity::from(tracing::Level::TRACE).number(), 1);
    }
}
