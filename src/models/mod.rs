//! Normalized row model for telemetry records
//!
//! These are the in-memory shapes that cross the ingestion pipeline:
//! created by the OTLP decoder, queued per signal, batched by the
//! workers, and written to ClickHouse column-for-column. Field order
//! matches the declared column order of the target tables.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Span kind, rendered to the store's lowercase enum spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    /// Operation internal to a service
    Internal,
    /// Server side of a remote call
    Server,
    /// Client side of a remote call
    Client,
    /// Message producer
    Producer,
    /// Message consumer
    Consumer,
}

impl SpanKind {
    /// Store enum spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Internal => "internal",
            SpanKind::Server => "server",
            SpanKind::Client => "client",
            SpanKind::Producer => "producer",
            SpanKind::Consumer => "consumer",
        }
    }

    /// Map the OTLP wire enum; unspecified and unknown values fall back
    /// to `internal`, matching the collector convention
    pub fn from_otlp(kind: i32) -> Self {
        match kind {
            2 => SpanKind::Server,
            3 => SpanKind::Client,
            4 => SpanKind::Producer,
            5 => SpanKind::Consumer,
            _ => SpanKind::Internal,
        }
    }
}

/// Span status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCode {
    /// No status recorded
    Unset,
    /// Completed successfully
    Ok,
    /// Completed with an error
    Error,
}

impl StatusCode {
    /// Store enum spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Unset => "unset",
            StatusCode::Ok => "ok",
            StatusCode::Error => "error",
        }
    }

    /// Map the OTLP wire enum
    pub fn from_otlp(code: i32) -> Self {
        match code {
            1 => StatusCode::Ok,
            2 => StatusCode::Error,
            _ => StatusCode::Unset,
        }
    }
}

/// Metric data point kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Last-value gauge
    Gauge,
    /// Monotonic or delta sum
    Counter,
    /// Bucketed distribution
    Histogram,
    /// Pre-computed quantiles
    Summary,
}

impl MetricType {
    /// Store enum spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
            MetricType::Histogram => "histogram",
            MetricType::Summary => "summary",
        }
    }
}

/// One unit of traced work
#[derive(Debug, Clone, Serialize)]
pub struct Span {
    /// Partitioning timestamp (equals the start time)
    pub timestamp: DateTime<Utc>,
    /// 32-char lowercase hex trace id
    pub trace_id: String,
    /// 16-char lowercase hex span id
    pub span_id: String,
    /// 16-char lowercase hex parent id, empty for root spans
    pub parent_span_id: String,
    /// Operation name
    pub span_name: String,
    /// Span kind
    pub span_kind: SpanKind,
    /// Start of the operation
    pub start_time: DateTime<Utc>,
    /// End of the operation
    pub end_time: DateTime<Utc>,
    /// End minus start, in nanoseconds
    pub duration_ns: u64,
    /// Status code
    pub status_code: StatusCode,
    /// Optional status message
    pub status_message: String,
    /// `service.name` resource attribute
    pub service_name: String,
    /// `service.namespace` resource attribute
    pub service_namespace: String,
    /// `service.instance.id` resource attribute
    pub service_instance_id: String,
    /// `deployment.environment` resource attribute
    pub deployment_environment: String,
    /// Flattened span attributes
    pub attributes: HashMap<String, String>,
    /// Flattened resource attributes
    pub resource_attributes: HashMap<String, String>,
    /// Ordered span events
    pub events: Vec<SpanEvent>,
    /// Ordered span links
    pub links: Vec<SpanLink>,
    /// Instrumentation scope name (empty allowed, never absent)
    pub instrumentation_scope_name: String,
    /// Instrumentation scope version
    pub instrumentation_scope_version: String,
}

/// An event nested in a span
#[derive(Debug, Clone, Serialize)]
pub struct SpanEvent {
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Event name
    pub name: String,
    /// Flattened event attributes
    pub attributes: HashMap<String, String>,
}

/// A link from one span to another
#[derive(Debug, Clone, Serialize)]
pub struct SpanLink {
    /// Referenced trace id
    pub trace_id: String,
    /// Referenced span id
    pub span_id: String,
    /// W3C trace state of the link
    pub trace_state: String,
    /// Flattened link attributes
    pub attributes: HashMap<String, String>,
}

/// A single metric data point
#[derive(Debug, Clone, Serialize)]
pub struct Metric {
    /// Observation timestamp
    pub timestamp: DateTime<Utc>,
    /// Metric name
    pub metric_name: String,
    /// Data point kind
    pub metric_type: MetricType,
    /// Point value (sum for histogram/summary points)
    pub value: f64,
    /// `service.name` resource attribute
    pub service_name: String,
    /// `service.namespace` resource attribute
    pub service_namespace: String,
    /// `service.instance.id` resource attribute
    pub service_instance_id: String,
    /// `deployment.environment` resource attribute
    pub deployment_environment: String,
    /// Flattened data point attributes
    pub attributes: HashMap<String, String>,
    /// Flattened resource attributes
    pub resource_attributes: HashMap<String, String>,
    /// Histogram bucket counts; always `explicit_bounds.len() + 1`
    /// entries for histogram points, empty otherwise
    pub bucket_counts: Vec<u64>,
    /// Histogram bucket upper bounds, strictly ascending
    pub explicit_bounds: Vec<f64>,
    /// Instrumentation scope name
    pub instrumentation_scope_name: String,
    /// Instrumentation scope version
    pub instrumentation_scope_version: String,
}

/// A single log record
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Time the record was observed by the collector chain
    pub observed_timestamp: DateTime<Utc>,
    /// OpenTelemetry severity number (1..24)
    pub severity_number: u8,
    /// Severity text as emitted
    pub severity_text: String,
    /// String rendering of the body
    pub body: String,
    /// Body shape tag: `string`, `json`, or `bytes`
    pub body_type: String,
    /// `service.name` resource attribute
    pub service_name: String,
    /// `service.namespace` resource attribute
    pub service_namespace: String,
    /// `service.instance.id` resource attribute
    pub service_instance_id: String,
    /// `deployment.environment` resource attribute
    pub deployment_environment: String,
    /// `host.name` resource attribute
    pub host_name: String,
    /// Correlated trace id, empty when uncorrelated
    pub trace_id: String,
    /// Correlated span id, empty when uncorrelated
    pub span_id: String,
    /// W3C trace flags byte
    pub trace_flags: u8,
    /// Flattened record attributes
    pub attributes: HashMap<String, String>,
    /// Flattened resource attributes
    pub resource_attributes: HashMap<String, String>,
    /// Instrumentation scope name
    pub instrumentation_scope_name: String,
    /// Instrumentation scope version
    pub instrumentation_scope_version: String,
}

/// Per-trace roll-up, materialized by the store and read-only here
#[derive(Debug, Clone, Serialize)]
pub struct TraceIndex {
    /// Trace id
    pub trace_id: String,
    /// Earliest span timestamp in the trace
    pub min_timestamp: DateTime<Utc>,
    /// Latest span timestamp in the trace
    pub max_timestamp: DateTime<Utc>,
    /// Services that contributed spans
    pub service_names: Vec<String>,
    /// Service owning the root span
    pub root_service_name: String,
    /// Name of the root span
    pub root_span_name: String,
    /// Max end minus min start, in nanoseconds
    pub duration_ns: u64,
    /// Number of spans in the trace
    pub span_count: u32,
    /// True when any span carries an error status
    pub has_errors: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_kind_round_trips_store_spelling() {
        assert_eq!(SpanKind::from_otlp(2).as_str(), "server");
        assert_eq!(SpanKind::from_otlp(0).as_str(), "internal");
        assert_eq!(SpanKind::from_otlp(99).as_str(), "internal");
    }

    #[test]
    fn status_code_maps_wire_values() {
        assert_eq!(StatusCode::from_otlp(0).as_str(), "unset");
        assert_eq!(StatusCode::from_otlp(1).as_str(), "ok");
        assert_eq!(StatusCode::from_otlp(2).as_str(), "error");
    }

    #[test]
    fn enums_serialize_as_lowercase_strings() {
        assert_eq!(
            serde_json::to_string(&MetricType::Histogram).unwrap(),
            "\"histogram\""
        );
        assert_eq!(serde_json::to_string(&SpanKind::Client).unwrap(), "\"client\"");
    }
}
