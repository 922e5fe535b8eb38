//! Aggregated metric points and their JSON projection.
//!
//! A point's `value` shape depends on its type:
//!
//! - sums and gauges: a JSON number
//! - histograms: count, sum, bucket counts, explicit bounds, min and max
//! - exponential histograms: scale, zero count and positive buckets
//!
//! Exponential histograms carry positive buckets only. Negative buckets are
//! not modelled, so values below zero are not represented in those documents.

use super::{format_attributes, format_resource, format_timestamp, json_f64, RecordKind, TelemetryRecord};
use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use serde_json::Value as JsonValue;

/// Metric aggregation type as written to the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    LongSum,
    DoubleSum,
    LongGauge,
    DoubleGauge,
    Histogram,
    ExponentialHistogram,
}

impl MetricType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LongSum => "LongSum",
            Self::DoubleSum => "DoubleSum",
            Self::LongGauge => "LongGauge",
            Self::DoubleGauge => "DoubleGauge",
            Self::Histogram => "Histogram",
            Self::ExponentialHistogram => "ExponentialHistogram",
        }
    }
}

/// Explicit-bucket histogram data.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramData {
    pub count: u64,
    pub sum: f64,
    /// One count per bucket; the last bucket is the implicit `+inf` one.
    pub bucket_counts: Vec<u64>,
    /// Upper bounds of every bucket except the last.
    pub explicit_bounds: Vec<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl HistogramData {
    /// Aggregates raw samples over explicit bucket bounds.
    ///
    /// Bucket `i` counts samples in `(bounds[i-1], bounds[i]]`; the final
    /// bucket counts everything above the last bound. Non-finite bounds are
    /// dropped and the rest sorted, so `+inf` never appears explicitly.
    /// NaN samples are ignored.
    #[must_use]
    pub fn from_samples(bounds: &[f64], samples: &[f64]) -> Self {
        let mut explicit_bounds: Vec<f64> = bounds.iter().copied().filter(|b| b.is_finite()).collect();
        explicit_bounds.sort_by(f64::total_cmp);
        explicit_bounds.dedup();

        let mut bucket_counts = vec![0_u64; explicit_bounds.len() + 1];
        let mut count = 0_u64;
        let mut sum = 0.0;
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;

        for &sample in samples.iter().filter(|s| !s.is_nan()) {
            let bucket = explicit_bounds.partition_point(|bound| *bound < sample);
            bucket_counts[bucket] += 1;
            count += 1;
            sum += sample;
            min = Some(min.map_or(sample, |m| m.min(sample)));
            max = Some(max.map_or(sample, |m| m.max(sample)));
        }

        Self {
            count,
            sum,
            bucket_counts,
            explicit_bounds,
            min,
            max,
        }
    }

    fn to_json(&self) -> JsonValue {
        let bounds: Vec<JsonValue> = self
            .explicit_bounds
            .iter()
            .filter(|bound| bound.is_finite())
            .map(|bound| json_f64(*bound))
            .collect();

        serde_json::json!({
            "count": self.count,
            "sum": json_f64(self.sum),
            "bucketCounts": self.bucket_counts,
            "explicitBounds": bounds,
            "min": self.min.map_or(JsonValue::Null, json_f64),
            "max": self.max.map_or(JsonValue::Null, json_f64),
        })
    }
}

/// Base-2 exponential histogram data (positive range only).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialHistogramData {
    pub scale: i8,
    pub zero_count: u64,
    pub positive_offset: i32,
    pub positive_bucket_counts: Vec<u64>,
}

impl ExponentialHistogramData {
    fn to_json(&self) -> JsonValue {
        serde_json::json!({
            "scale": self.scale,
            "zeroCount": self.zero_count,
            "positiveBuckets": {
                "offset": self.positive_offset,
                "bucketCounts": self.positive_bucket_counts,
            },
        })
    }
}

/// Type-dependent value of a metric point.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    LongSum(i64),
    DoubleSum(f64),
    LongGauge(i64),
    DoubleGauge(f64),
    Histogram(HistogramData),
    ExponentialHistogram(ExponentialHistogramData),
}

impl MetricValue {
    #[must_use]
    pub const fn metric_type(&self) -> MetricType {
        match self {
            Self::LongSum(_) => MetricType::LongSum,
            Self::DoubleSum(_) => MetricType::DoubleSum,
            Self::LongGauge(_) => MetricType::LongGauge,
            Self::DoubleGauge(_) => MetricType::DoubleGauge,
            Self::Histogram(_) => MetricType::Histogram,
            Self::ExponentialHistogram(_) => MetricType::ExponentialHistogram,
        }
    }

    fn to_json(&self) -> JsonValue {
        match self {
            Self::LongSum(value) | Self::LongGauge(value) => JsonValue::from(*value),
            Self::DoubleSum(value) | Self::DoubleGauge(value) => json_f64(*value),
            Self::Histogram(data) => data.to_json(),
            Self::ExponentialHistogram(data) => data.to_json(),
        }
    }
}

/// One aggregated measurement of a named metric over a time window.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPoint {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub tags: Vec<KeyValue>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub value: MetricValue,
}

impl MetricPoint {
    pub fn new(
        name: impl Into<String>,
        value: MetricValue,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            tags: Vec::new(),
            start_time,
            end_time,
            value,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    #[must_use]
    pub fn with_tag(mut self, tag: KeyValue) -> Self {
        self.tags.push(tag);
        self
    }
}

impl TelemetryRecord for MetricPoint {
    const KIND: RecordKind = RecordKind::Metrics;

    fn to_document(&self, resource: Option<&Resource>) -> JsonValue {
        serde_json::json!({
            "timestamp": format_timestamp(&self.end_time),
            "startTime": format_timestamp(&self.start_time),
            "endTime": format_timestamp(&self.end_time),
            "name": self.name,
            "description": self.description,
            "unit": self.unit,
            "type": self.value.metric_type().as_str(),
            "tags": format_attributes(&self.tags),
            "value": self.value.to_json(),
            "resource": format_resource(resource),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 10).unwrap(),
        )
    }

    #[test]
    fn test_histogram_from_samples() {
        let data = HistogramData::from_samples(&[10.0, 1.0, f64::INFINITY, 5.0], &[0.5, 1.0, 3.0, 7.0, 50.0, f64::NAN]);

        assert_eq!(data.explicit_bounds, vec![1.0, 5.0, 10.0]);
        assert_eq!(data.bucket_counts, vec![2, 1, 1, 1]);
        assert_eq!(data.count, 5);
        assert_eq!(data.sum, 61.5);
        assert_eq!(data.min, Some(0.5));
        assert_eq!(data.max, Some(50.0));
    }

    #[test]
    fn test_empty_histogram_has_null_min_max() {
        let (start, end) = window();
        let point = MetricPoint::new(
            "latency",
            MetricValue::Histogram(HistogramData::from_samples(&[1.0], &[])),
            start,
            end,
        );
        let doc = point.to_document(None);

        assert_eq!(doc["type"], "Histogram");
        assert_eq!(doc["value"]["count"], 0);
        assert_eq!(doc["value"]["bucketCounts"], serde_json::json!([0, 0]));
        assert_eq!(doc["value"]["explicitBounds"], serde_json::json!([1.0]));
        assert_eq!(doc["value"]["min"], JsonValue::Null);
    }

    #[test]
    fn test_scalar_points() {
        let (start, end) = window();
        let counter = MetricPoint::new("requests", MetricValue::LongSum(12), start, end)
            .with_unit("{request}")
            .with_description("Handled requests")
            .with_tag(KeyValue::new("route", "/"));
        let doc = counter.to_document(None);

        assert_eq!(doc["type"], "LongSum");
        assert_eq!(doc["value"], 12);
        assert_eq!(doc["unit"], "{request}");
        assert_eq!(doc["tags"][0]["key"], "route");
        assert_eq!(doc["timestamp"], doc["endTime"]);

        let gauge = MetricPoint::new("temp", MetricValue::DoubleGauge(f64::NAN), start, end);
        assert_eq!(gauge.to_document(None)["value"], JsonValue::Null);
    }

    #[test]
    fn test_exponential_histogram_document() {
        let (start, end) = window();
        let point = MetricPoint::new(
            "sizes",
            MetricValue::ExponentialHistogram(ExponentialHistogramData {
                scale: 3,
                zero_count: 1,
                positive_offset: -2,
                positive_bucket_counts: vec![4, 0, 1],
            }),
            start,
            end,
        );
        let doc = point.to_document(None);

        assert_eq!(doc["type"], "ExponentialHistogram");
        assert_eq!(doc["value"]["scale"], 3);
        assert_eq!(doc["value"]["positiveBuckets"]["offset"], -2);
        assert_eq!(doc["value"]["positiveBuckets"]["bucketCounts"], serde_json::json!([4, 0, 1]));
        assert!(doc["value"].get("negativeBuckets").is_none());
    }
}
