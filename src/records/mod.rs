//! Telemetry records and their JSON document projection.
//!
//! Each record kind is an immutable, already finished unit of observability
//! data. The sink never mutates a record; it only asks it for a fresh
//! [`JsonValue`] document through [`TelemetryRecord::to_document`].
//!
//! # Document Conventions
//!
//! - Field names are camelCase.
//! - Timestamps are RFC 3339 UTC strings with nanosecond precision.
//! - Attribute sequences keep their order and use the OTLP JSON shape:
//!   `[{"key": "k", "value": {"stringValue": "v"}}]`.
//! - Anything that cannot be represented (no resource, non-finite floats)
//!   becomes `null` instead of failing the record.
//!
//! # Modules
//!
//! - [`span`]: finished trace spans
//! - [`log`]: structured log records with scope attribute merging
//! - [`metric`]: aggregated metric points (sums, gauges, histograms)

pub mod log;
pub mod metric;
pub mod span;

pub use log::{EventId, ExceptionInfo, LogRecord, Severity};
pub use metric::{ExponentialHistogramData, HistogramData, MetricPoint, MetricType, MetricValue};
pub use span::{SpanEventRecord, SpanLinkRecord, SpanRecord};

use chrono::{DateTime, SecondsFormat, Utc};
use opentelemetry::{KeyValue, Value};
use opentelemetry_sdk::Resource;
use serde_json::Value as JsonValue;

/// The three kinds of telemetry a sink can be dedicated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Traces,
    Logs,
    Metrics,
}

impl RecordKind {
    /// File name prefix for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Traces => "traces",
            Self::Logs => "logs",
            Self::Metrics => "metrics",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finished telemetry record that can be projected into a JSON document.
///
/// Implementations are pure: building a document has no side effects and
/// never fails. Fields that cannot be read degrade to `null` or are left out.
pub trait TelemetryRecord: Send + Sync {
    /// Kind of the record, which also selects the output file prefix.
    const KIND: RecordKind;

    /// Builds the document for this record.
    ///
    /// `resource` carries the attributes that apply to every record of the
    /// provider; `None` is written as `"resource": null`.
    fn to_document(&self, resource: Option<&Resource>) -> JsonValue;
}

/// Formats a timestamp the way every document field expects it.
#[must_use]
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Converts a float to a JSON number, mapping NaN and infinities to `null`.
#[must_use]
pub fn json_f64(value: f64) -> JsonValue {
    serde_json::Number::from_f64(value).map_or(JsonValue::Null, JsonValue::Number)
}

/// Formats an ordered attribute list as an OTLP JSON array.
///
/// Each attribute is converted to `{"key": "...", "value": {...}}` format.
#[must_use]
pub fn format_attributes(attributes: &[KeyValue]) -> Vec<JsonValue> {
    attributes
        .iter()
        .map(|kv| {
            serde_json::json!({
                "key": kv.key.as_str(),
                "value": format_attribute_value(&kv.value),
            })
        })
        .collect()
}

/// Formats an attribute value as OTLP JSON.
///
/// Maps OpenTelemetry value types to OTLP value types:
/// - Bool → `{"boolValue": true}`
/// - I64 → `{"intValue": "123"}` (as string)
/// - F64 → `{"doubleValue": 1.23}`
/// - String → `{"stringValue": "..."}`
/// - Array → `{"arrayValue": {"values": [...]}}`
#[must_use]
pub fn format_attribute_value(value: &Value) -> JsonValue {
    use opentelemetry::Array;

    match value {
        Value::Bool(b) => serde_json::json!({ "boolValue": b }),
        Value::I64(i) => serde_json::json!({ "intValue": i.to_string() }),
        Value::F64(f) => serde_json::json!({ "doubleValue": json_f64(*f) }),
        Value::String(s) => serde_json::json!({ "stringValue": s.as_str() }),
        Value::Array(array) => {
            let values: Vec<JsonValue> = match array {
                Array::Bool(items) => items
                    .iter()
                    .map(|b| format_attribute_value(&Value::Bool(*b)))
                    .collect(),
                Array::I64(items) => items
                    .iter()
                    .map(|i| format_attribute_value(&Value::I64(*i)))
                    .collect(),
                Array::F64(items) => items
                    .iter()
                    .map(|f| format_attribute_value(&Value::F64(*f)))
                    .collect(),
                Array::String(items) => items
                    .iter()
                    .map(|s| serde_json::json!({ "stringValue": s.as_str() }))
                    .collect(),
                #[allow(unreachable_patterns)]
                _ => vec![serde_json::json!({ "stringValue": format!("{array:?}") })],
            };
            serde_json::json!({ "arrayValue": { "values": values } })
        }
        #[allow(unreachable_patterns)]
        _ => serde_json::json!({ "stringValue": format!("{value:?}") }),
    }
}

/// Formats the provider resource, or `null` when there is none.
#[must_use]
pub fn format_resource(resource: Option<&Resource>) -> JsonValue {
    resource.map_or(JsonValue::Null, |resource| {
        let attributes: Vec<JsonValue> = resource
            .iter()
            .map(|(key, value)| {
                serde_json::json!({
                    "key": key.as_str(),
                    "value": format_attribute_value(value),
                })
            })
            .collect();
        JsonValue::Array(attributes)
    })
}
