//! Row encoding for columnar inserts
//!
//! Each record becomes one JSONEachRow object whose fields match the
//! declared column order of the target table. Nested events and links
//! are encoded as arrays of tuples, preserving tuple field order.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::models::{LogRecord, Metric, Span};

pub(crate) const SPANS_TABLE: &str = "otel_traces";
pub(crate) const METRICS_TABLE: &str = "otel_metrics";
pub(crate) const LOGS_TABLE: &str = "otel_logs";

const SPAN_COLUMNS: &str = "timestamp, trace_id, span_id, parent_span_id, \
     span_name, span_kind, start_time, end_time, duration_ns, \
     status_code, status_message, \
     service_name, service_namespace, service_instance_id, deployment_environment, \
     attributes, resource_attributes, events, links, \
     instrumentation_scope_name, instrumentation_scope_version";

const METRIC_COLUMNS: &str = "timestamp, metric_name, metric_type, value, \
     service_name, service_namespace, service_instance_id, deployment_environment, \
     attributes, resource_attributes, bucket_counts, explicit_bounds, \
     instrumentation_scope_name, instrumentation_scope_version";

const LOG_COLUMNS: &str = "timestamp, observed_timestamp, severity_number, severity_text, \
     body, body_type, \
     service_name, service_namespace, service_instance_id, deployment_environment, host_name, \
     trace_id, span_id, trace_flags, attributes, resource_attributes, \
     instrumentation_scope_name, instrumentation_scope_version";

pub(crate) fn insert_spans_sql() -> String {
    format!("INSERT INTO {SPANS_TABLE} ({SPAN_COLUMNS}) FORMAT JSONEachRow")
}

pub(crate) fn insert_metrics_sql() -> String {
    format!("INSERT INTO {METRICS_TABLE} ({METRIC_COLUMNS}) FORMAT JSONEachRow")
}

pub(crate) fn insert_logs_sql() -> String {
    format!("INSERT INTO {LOGS_TABLE} ({LOG_COLUMNS}) FORMAT JSONEachRow")
}

/// DateTime64(9) rendering accepted by ClickHouse on input
pub fn format_datetime(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.9f").to_string()
}

pub(crate) fn span_row(span: &Span) -> Value {
    let events: Vec<Value> = span
        .events
        .iter()
        .map(|e| json!([format_datetime(e.timestamp), e.name, e.attributes]))
        .collect();
    let links: Vec<Value> = span
        .links
        .iter()
        .map(|l| json!([l.trace_id, l.span_id, l.trace_state, l.attributes]))
        .collect();

    json!({
        "timestamp": format_datetime(span.timestamp),
        "trace_id": span.trace_id,
        "span_id": span.span_id,
        "parent_span_id": span.parent_span_id,
        "span_name": span.span_name,
        "span_kind": span.span_kind,
        "start_time": format_datetime(span.start_time),
        "end_time": format_datetime(span.end_time),
        "duration_ns": span.duration_ns,
        "status_code": span.status_code,
        "status_message": span.status_message,
        "service_name": span.service_name,
        "service_namespace": span.service_namespace,
        "service_instance_id": span.service_instance_id,
        "deployment_environment": span.deployment_environment,
        "attributes": span.attributes,
        "resource_attributes": span.resource_attributes,
        "events": events,
        "links": links,
        "instrumentation_scope_name": span.instrumentation_scope_name,
        "instrumentation_scope_version": span.instrumentation_scope_version,
    })
}

pub(crate) fn metric_row(metric: &Metric) -> Value {
    json!({
        "timestamp": format_datetime(metric.timestamp),
        "metric_name": metric.metric_name,
        "metric_type": metric.metric_type,
        "value": metric.value,
        "service_name": metric.service_name,
        "service_namespace": metric.service_namespace,
        "service_instance_id": metric.service_instance_id,
        "deployment_environment": metric.deployment_environment,
        "attributes": metric.attributes,
        "resource_attributes": metric.resource_attributes,
        "bucket_counts": metric.bucket_counts,
        "explicit_bounds": metric.explicit_bounds,
        "instrumentation_scope_name": metric.instrumentation_scope_name,
        "instrumentation_scope_version": metric.instrumentation_scope_version,
    })
}

pub(crate) fn log_row(log: &LogRecord) -> Value {
    json!({
        "timestamp": format_datetime(log.timestamp),
        "observed_timestamp": format_datetime(log.observed_timestamp),
        "severity_number": log.severity_number,
        "severity_text": log.severity_text,
        "body": log.body,
        "body_type": log.body_type,
        "service_name": log.service_name,
        "service_namespace": log.service_namespace,
        "service_instance_id": log.service_instance_id,
        "deployment_environment": log.deployment_environment,
        "host_name": log.host_name,
        "trace_id": log.trace_id,
        "span_id": log.span_id,
        "trace_flags": log.trace_flags,
        "attributes": log.attributes,
        "resource_attributes": log.resource_attributes,
        "instrumentation_scope_name": log.instrumentation_scope_name,
        "instrumentation_scope_version": log.instrumentation_scope_version,
    })
}
