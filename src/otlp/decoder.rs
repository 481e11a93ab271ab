//! OTLP protobuf decoding into the normalized row model
//!
//! The decoder never fails an envelope: a malformed record is skipped
//! and counted, and the remaining records are returned. Attribute
//! values are flattened to strings; the OTLP value type is not
//! preserved.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use metrics::counter;
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{any_value, AnyValue, InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::metrics::v1::{metric, number_data_point};
use opentelemetry_proto::tonic::trace::v1 as tracepb;

use crate::models::{LogRecord, Metric, MetricType, Span, SpanEvent, SpanKind, SpanLink, StatusCode};
use crate::monitoring::names;

/// Resource attribute keys carrying the service identity
const KEY_SERVICE_NAME: &str = "service.name";
const KEY_SERVICE_NAMESPACE: &str = "service.namespace";
const KEY_SERVICE_INSTANCE_ID: &str = "service.instance.id";
const KEY_DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";
const KEY_HOST_NAME: &str = "host.name";

/// Decode an OTLP trace export request into span rows
///
/// Spans with malformed ids or a negative duration are skipped and
/// counted; the envelope itself never fails.
pub fn decode_spans(req: &ExportTraceServiceRequest) -> Vec<Span> {
    let mut out = Vec::new();
    for resource_spans in &req.resource_spans {
        let resource_attributes = resource_spans
            .resource
            .as_ref()
            .map(|r| convert_attributes(&r.attributes))
            .unwrap_or_default();

        for scope_spans in &resource_spans.scope_spans {
            let (scope_name, scope_version) = scope_parts(scope_spans.scope.as_ref());
            for span in &scope_spans.spans {
                match decode_span(span, &resource_attributes, &scope_name, &scope_version) {
                    Some(s) => out.push(s),
                    None => invalid_record("spans"),
                }
            }
        }
    }
    out
}

fn decode_span(
    span: &tracepb::Span,
    resource_attributes: &HashMap<String, String>,
    scope_name: &str,
    scope_version: &str,
) -> Option<Span> {
    if span.trace_id.len() != 16 || span.span_id.len() != 8 {
        return None;
    }
    // Parent is either absent or a full span id
    if !span.parent_span_id.is_empty() && span.parent_span_id.len() != 8 {
        return None;
    }

    let start_time = unix_nanos(span.start_time_unix_nano)?;
    let end_time = unix_nanos(span.end_time_unix_nano)?;
    if span.end_time_unix_nano < span.start_time_unix_nano {
        return None;
    }
    let duration_ns = span.end_time_unix_nano - span.start_time_unix_nano;

    let (status_code, status_message) = match &span.status {
        Some(status) => (StatusCode::from_otlp(status.code), status.message.clone()),
        None => (StatusCode::Unset, String::new()),
    };

    let events = span
        .events
        .iter()
        .map(|e| SpanEvent {
            timestamp: unix_nanos_clamped(e.time_unix_nano),
            name: e.name.clone(),
            attributes: convert_attributes(&e.attributes),
        })
        .collect();

    let links = span
        .links
        .iter()
        .map(|l| SpanLink {
            trace_id: hex_encode(&l.trace_id),
            span_id: hex_encode(&l.span_id),
            trace_state: l.trace_state.clone(),
            attributes: convert_attributes(&l.attributes),
        })
        .collect();

    Some(Span {
        timestamp: start_time,
        trace_id: hex_encode(&span.trace_id),
        span_id: hex_encode(&span.span_id),
        parent_span_id: hex_encode(&span.parent_span_id),
        span_name: span.name.clone(),
        span_kind: SpanKind::from_otlp(span.kind),
        start_time,
        end_time,
        duration_ns,
        status_code,
        status_message,
        service_name: attr(resource_attributes, KEY_SERVICE_NAME),
        service_namespace: attr(resource_attributes, KEY_SERVICE_NAMESPACE),
        service_instance_id: attr(resource_attributes, KEY_SERVICE_INSTANCE_ID),
        deployment_environment: attr(resource_attributes, KEY_DEPLOYMENT_ENVIRONMENT),
        attributes: convert_attributes(&span.attributes),
        resource_attributes: resource_attributes.clone(),
        events,
        links,
        instrumentation_scope_name: scope_name.to_string(),
        instrumentation_scope_version: scope_version.to_string(),
    })
}

/// Decode an OTLP metrics export request into data point rows
///
/// Every data point becomes one row. Histogram points with mismatched
/// bucket/bound arrays and exponential histograms (not representable)
/// are skipped and counted.
pub fn decode_metrics(req: &ExportMetricsServiceRequest) -> Vec<Metric> {
    let mut out = Vec::new();
    for resource_metrics in &req.resource_metrics {
        let resource_attributes = resource_metrics
            .resource
            .as_ref()
            .map(|r| convert_attributes(&r.attributes))
            .unwrap_or_default();

        for scope_metrics in &resource_metrics.scope_metrics {
            let (scope_name, scope_version) = scope_parts(scope_metrics.scope.as_ref());
            for metric in &scope_metrics.metrics {
                decode_metric(
                    metric,
                    &resource_attributes,
                    &scope_name,
                    &scope_version,
                    &mut out,
                );
            }
        }
    }
    out
}

fn decode_metric(
    metric: &opentelemetry_proto::tonic::metrics::v1::Metric,
    resource_attributes: &HashMap<String, String>,
    scope_name: &str,
    scope_version: &str,
    out: &mut Vec<Metric>,
) {
    let base = |metric_type: MetricType,
                time_unix_nano: u64,
                value: f64,
                attributes: HashMap<String, String>,
                bucket_counts: Vec<u64>,
                explicit_bounds: Vec<f64>|
     -> Option<Metric> {
        Some(Metric {
            timestamp: unix_nanos(time_unix_nano)?,
            metric_name: metric.name.clone(),
            metric_type,
            value,
            service_name: attr(resource_attributes, KEY_SERVICE_NAME),
            service_namespace: attr(resource_attributes, KEY_SERVICE_NAMESPACE),
            service_instance_id: attr(resource_attributes, KEY_SERVICE_INSTANCE_ID),
            deployment_environment: attr(resource_attributes, KEY_DEPLOYMENT_ENVIRONMENT),
            attributes,
            resource_attributes: resource_attributes.clone(),
            bucket_counts,
            explicit_bounds,
            instrumentation_scope_name: scope_name.to_string(),
            instrumentation_scope_version: scope_version.to_string(),
        })
    };

    match &metric.data {
        Some(metric::Data::Gauge(gauge)) => {
            for point in &gauge.data_points {
                match base(
                    MetricType::Gauge,
                    point.time_unix_nano,
                    number_value(point),
                    convert_attributes(&point.attributes),
                    Vec::new(),
                    Vec::new(),
                ) {
                    Some(m) => out.push(m),
                    None => invalid_record("metrics"),
                }
            }
        }
        Some(metric::Data::Sum(sum)) => {
            for point in &sum.data_points {
                match base(
                    MetricType::Counter,
                    point.time_unix_nano,
                    number_value(point),
                    convert_attributes(&point.attributes),
                    Vec::new(),
                    Vec::new(),
                ) {
                    Some(m) => out.push(m),
                    None => invalid_record("metrics"),
                }
            }
        }
        Some(metric::Data::Histogram(histogram)) => {
            for point in &histogram.data_points {
                if point.bucket_counts.len() != point.explicit_bounds.len() + 1
                    || !point.explicit_bounds.windows(2).all(|w| w[0] < w[1])
                {
                    invalid_record("metrics");
                    continue;
                }
                match base(
                    MetricType::Histogram,
                    point.time_unix_nano,
                    point.sum.unwrap_or(0.0),
                    convert_attributes(&point.attributes),
                    point.bucket_counts.clone(),
                    point.explicit_bounds.clone(),
                ) {
                    Some(m) => out.push(m),
                    None => invalid_record("metrics"),
                }
            }
        }
        Some(metric::Data::Summary(summary)) => {
            for point in &summary.data_points {
                match base(
                    MetricType::Summary,
                    point.time_unix_nano,
                    point.sum,
                    convert_attributes(&point.attributes),
                    Vec::new(),
                    Vec::new(),
                ) {
                    Some(m) => out.push(m),
                    None => invalid_record("metrics"),
                }
            }
        }
        Some(metric::Data::ExponentialHistogram(histogram)) => {
            for _ in &histogram.data_points {
                invalid_record("metrics");
            }
        }
        None => invalid_record("metrics"),
    }
}

/// Decode an OTLP logs export request into log rows
pub fn decode_logs(req: &ExportLogsServiceRequest) -> Vec<LogRecord> {
    let mut out = Vec::new();
    for resource_logs in &req.resource_logs {
        let resource_attributes = resource_logs
            .resource
            .as_ref()
            .map(|r| convert_attributes(&r.attributes))
            .unwrap_or_default();

        for scope_logs in &resource_logs.scope_logs {
            let (scope_name, scope_version) = scope_parts(scope_logs.scope.as_ref());
            for record in &scope_logs.log_records {
                match decode_log(record, &resource_attributes, &scope_name, &scope_version) {
                    Some(l) => out.push(l),
                    None => invalid_record("logs"),
                }
            }
        }
    }
    out
}

fn decode_log(
    record: &opentelemetry_proto::tonic::logs::v1::LogRecord,
    resource_attributes: &HashMap<String, String>,
    scope_name: &str,
    scope_version: &str,
) -> Option<LogRecord> {
    let timestamp = unix_nanos(record.time_unix_nano)?;
    let observed_timestamp = unix_nanos(record.observed_time_unix_nano)?;

    let (body, body_type) = flatten_body(record.body.as_ref());

    Some(LogRecord {
        timestamp,
        observed_timestamp,
        severity_number: record.severity_number.clamp(0, u8::MAX as i32) as u8,
        severity_text: record.severity_text.clone(),
        body,
        body_type,
        service_name: attr(resource_attributes, KEY_SERVICE_NAME),
        service_namespace: attr(resource_attributes, KEY_SERVICE_NAMESPACE),
        service_instance_id: attr(resource_attributes, KEY_SERVICE_INSTANCE_ID),
        deployment_environment: attr(resource_attributes, KEY_DEPLOYMENT_ENVIRONMENT),
        host_name: attr(resource_attributes, KEY_HOST_NAME),
        trace_id: correlation_id(&record.trace_id, 16),
        span_id: correlation_id(&record.span_id, 8),
        trace_flags: (record.flags & 0xff) as u8,
        attributes: convert_attributes(&record.attributes),
        resource_attributes: resource_attributes.clone(),
        instrumentation_scope_name: scope_name.to_string(),
        instrumentation_scope_version: scope_version.to_string(),
    })
}

/// Flatten a log body to its string rendering and shape tag
fn flatten_body(body: Option<&AnyValue>) -> (String, String) {
    match body.and_then(|b| b.value.as_ref()) {
        None => (String::new(), "string".to_string()),
        Some(any_value::Value::BytesValue(bytes)) => (hex_encode(bytes), "bytes".to_string()),
        Some(value @ (any_value::Value::ArrayValue(_) | any_value::Value::KvlistValue(_))) => (
            serde_json::to_string(&value_to_json(value)).unwrap_or_default(),
            "json".to_string(),
        ),
        Some(value) => (scalar_to_string(value), "string".to_string()),
    }
}

/// Flatten an attribute list to a string map; duplicate keys collapse,
/// last occurrence wins
pub(crate) fn convert_attributes(attributes: &[KeyValue]) -> HashMap<String, String> {
    let mut out = HashMap::with_capacity(attributes.len());
    for kv in attributes {
        out.insert(kv.key.clone(), flatten_any_value(kv.value.as_ref()));
    }
    out
}

/// Render an attribute value to its canonical string form
///
/// Strings pass through, numbers render in decimal, booleans as
/// `true`/`false`, bytes as lowercase hex, arrays and maps as JSON.
/// A missing value becomes the empty string.
pub(crate) fn flatten_any_value(value: Option<&AnyValue>) -> String {
    match value.and_then(|v| v.value.as_ref()) {
        None => String::new(),
        Some(any_value::Value::BytesValue(bytes)) => hex_encode(bytes),
        Some(value @ (any_value::Value::ArrayValue(_) | any_value::Value::KvlistValue(_))) => {
            serde_json::to_string(&value_to_json(value)).unwrap_or_default()
        }
        Some(value) => scalar_to_string(value),
    }
}

fn scalar_to_string(value: &any_value::Value) -> String {
    match value {
        any_value::Value::StringValue(s) => s.clone(),
        any_value::Value::BoolValue(b) => b.to_string(),
        any_value::Value::IntValue(i) => i.to_string(),
        any_value::Value::DoubleValue(d) => d.to_string(),
        any_value::Value::BytesValue(bytes) => hex_encode(bytes),
        any_value::Value::ArrayValue(_) | any_value::Value::KvlistValue(_) => String::new(),
    }
}

fn value_to_json(value: &any_value::Value) -> serde_json::Value {
    match value {
        any_value::Value::StringValue(s) => serde_json::Value::String(s.clone()),
        any_value::Value::BoolValue(b) => serde_json::Value::Bool(*b),
        any_value::Value::IntValue(i) => serde_json::Value::Number((*i).into()),
        any_value::Value::DoubleValue(d) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        any_value::Value::BytesValue(bytes) => serde_json::Value::String(hex_encode(bytes)),
        any_value::Value::ArrayValue(array) => serde_json::Value::Array(
            array.values.iter().map(optional_value_to_json).collect(),
        ),
        any_value::Value::KvlistValue(kvlist) => serde_json::Value::Object(
            kvlist
                .values
                .iter()
                .map(|kv| (kv.key.clone(), optional_value_to_json_ref(kv.value.as_ref())))
                .collect(),
        ),
    }
}

fn optional_value_to_json(value: &AnyValue) -> serde_json::Value {
    optional_value_to_json_ref(Some(value))
}

fn optional_value_to_json_ref(value: Option<&AnyValue>) -> serde_json::Value {
    match value.and_then(|v| v.value.as_ref()) {
        Some(inner) => value_to_json(inner),
        None => serde_json::Value::Null,
    }
}

/// Lowercase hex rendering of an opaque id; empty input yields an
/// empty string
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn attr(attributes: &HashMap<String, String>, key: &str) -> String {
    attributes.get(key).cloned().unwrap_or_default()
}

fn scope_parts(scope: Option<&InstrumentationScope>) -> (String, String) {
    match scope {
        Some(scope) => (scope.name.clone(), scope.version.clone()),
        None => (String::new(), String::new()),
    }
}

fn number_value(point: &opentelemetry_proto::tonic::metrics::v1::NumberDataPoint) -> f64 {
    match point.value {
        Some(number_data_point::Value::AsDouble(d)) => d,
        Some(number_data_point::Value::AsInt(i)) => i as f64,
        None => 0.0,
    }
}

/// Interpret a wire timestamp as Unix nanoseconds; values past the
/// representable range mark the record invalid
fn unix_nanos(nanos: u64) -> Option<DateTime<Utc>> {
    if nanos > i64::MAX as u64 {
        return None;
    }
    Some(DateTime::from_timestamp_nanos(nanos as i64))
}

fn unix_nanos_clamped(nanos: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos.min(i64::MAX as u64) as i64)
}

/// Correlation ids are optional on logs: a wrong-length id degrades to
/// "uncorrelated" instead of dropping the record
fn correlation_id(bytes: &[u8], expected_len: usize) -> String {
    if bytes.len() == expected_len {
        hex_encode(bytes)
    } else {
        String::new()
    }
}

fn invalid_record(signal: &'static str) {
    counter!(names::INVALID_RECORDS, "signal" => signal).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry_proto::tonic::common::v1::ArrayValue;

    fn any_string(s: &str) -> AnyValue {
        AnyValue {
            value: Some(any_value::Value::StringValue(s.to_string())),
        }
    }

    #[test]
    fn hex_encoding_is_lowercase_and_width_preserving() {
        assert_eq!(hex_encode(&[0xAB, 0x01, 0xFF]), "ab01ff");
        assert_eq!(hex_encode(&[]), "");
    }

    #[test]
    fn scalars_flatten_to_canonical_strings() {
        let int = AnyValue {
            value: Some(any_value::Value::IntValue(42)),
        };
        let double = AnyValue {
            value: Some(any_value::Value::DoubleValue(2.5)),
        };
        let boolean = AnyValue {
            value: Some(any_value::Value::BoolValue(true)),
        };
        assert_eq!(flatten_any_value(Some(&int)), "42");
        assert_eq!(flatten_any_value(Some(&double)), "2.5");
        assert_eq!(flatten_any_value(Some(&boolean)), "true");
        assert_eq!(flatten_any_value(None), "");
    }

    #[test]
    fn arrays_flatten_to_json() {
        let array = AnyValue {
            value: Some(any_value::Value::ArrayValue(ArrayValue {
                values: vec![any_string("a"), any_string("b")],
            })),
        };
        assert_eq!(flatten_any_value(Some(&array)), r#"["a","b"]"#);
    }

    #[test]
    fn duplicate_attribute_keys_collapse_last_wins() {
        let attrs = vec![
            KeyValue {
                key: "k".to_string(),
                value: Some(any_string("first")),
            },
            KeyValue {
                key: "k".to_string(),
                value: Some(any_string("second")),
            },
        ];
        let map = convert_attributes(&attrs);
        assert_eq!(map.len(), 1);
        assert_eq!(map["k"], "second");
    }
}
