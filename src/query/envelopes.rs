//! Request and response envelopes for the query API

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trace query request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraceQueryRequest {
    /// Exact trace id filter
    #[serde(default)]
    pub trace_id: Option<String>,
    /// Exact service name filter
    #[serde(default)]
    pub service_name: Option<String>,
    /// Window start (inclusive)
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Window end (inclusive)
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Minimum span duration in nanoseconds
    #[serde(default)]
    pub min_duration: Option<u64>,
    /// Maximum span duration in nanoseconds
    #[serde(default)]
    pub max_duration: Option<u64>,
    /// Row limit (default 100)
    #[serde(default)]
    pub limit: Option<u32>,
}

/// One span in a trace query response
#[derive(Debug, Clone, Serialize)]
pub struct SpanResult {
    /// Trace id
    pub trace_id: String,
    /// Span id
    pub span_id: String,
    /// Parent span id, empty for roots
    pub parent_span_id: String,
    /// Operation name
    pub span_name: String,
    /// Span kind as stored
    pub span_kind: String,
    /// Start of the operation
    pub start_time: DateTime<Utc>,
    /// End of the operation
    pub end_time: DateTime<Utc>,
    /// Duration in nanoseconds
    pub duration_ns: u64,
    /// Status code as stored
    pub status_code: String,
    /// Status message
    pub status_message: String,
    /// Owning service
    pub service_name: String,
    /// Span attributes
    pub attributes: HashMap<String, String>,
}

/// Trace query response
#[derive(Debug, Serialize)]
pub struct TraceQueryResponse {
    /// Matching spans, newest first
    pub spans: Vec<SpanResult>,
    /// Number of spans returned
    pub total: usize,
}

/// Metrics query request
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsQueryRequest {
    /// Metric to aggregate
    pub metric_name: String,
    /// Exact service name filter
    #[serde(default)]
    pub service_name: Option<String>,
    /// Window start (inclusive)
    pub start_time: DateTime<Utc>,
    /// Window end (inclusive)
    pub end_time: DateTime<Utc>,
    /// One of avg, min, max, sum (default avg)
    #[serde(default)]
    pub aggregation: Option<String>,
    /// Accepted for compatibility; bucketing is fixed at 5 minutes
    #[serde(default)]
    pub step: Option<String>,
}

/// One time bucket in a metrics query response
#[derive(Debug, Clone, Serialize)]
pub struct MetricDataPoint {
    /// Bucket start
    pub timestamp: DateTime<Utc>,
    /// Aggregated value
    pub value: f64,
}

/// Metrics query response
#[derive(Debug, Serialize)]
pub struct MetricsQueryResponse {
    /// Echo of the requested metric
    pub metric_name: String,
    /// Buckets in ascending time order
    pub data_points: Vec<MetricDataPoint>,
}

/// Logs query request
#[derive(Debug, Clone, Deserialize)]
pub struct LogsQueryRequest {
    /// Exact service name filter
    #[serde(default)]
    pub service_name: Option<String>,
    /// Window start (inclusive)
    pub start_time: DateTime<Utc>,
    /// Window end (inclusive)
    pub end_time: DateTime<Utc>,
    /// Exact severity text filter
    #[serde(default)]
    pub severity: Option<String>,
    /// Substring match on the body
    #[serde(default)]
    pub search_text: Option<String>,
    /// Exact trace id filter
    #[serde(default)]
    pub trace_id: Option<String>,
    /// Row limit (default 100)
    #[serde(default)]
    pub limit: Option<u32>,
}

/// One record in a logs query response
#[derive(Debug, Clone, Serialize)]
pub struct LogResult {
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Severity text as stored
    pub severity_text: String,
    /// Log body
    pub body: String,
    /// Owning service
    pub service_name: String,
    /// Correlated trace id, empty when uncorrelated
    pub trace_id: String,
    /// Correlated span id, empty when uncorrelated
    pub span_id: String,
    /// Record attributes
    pub attributes: HashMap<String, String>,
}

/// Logs query response
#[derive(Debug, Serialize)]
pub struct LogsQueryResponse {
    /// Matching records, newest first
    pub logs: Vec<LogResult>,
    /// Number of records returned
    pub total: usize,
}

/// Per-service span statistics over the stats lookback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStat {
    /// Service name
    pub service_name: String,
    /// Spans recorded in the window
    pub span_count: u64,
    /// Mean span duration in nanoseconds
    pub avg_duration_ns: f64,
    /// 95th percentile span duration in nanoseconds
    pub p95_duration_ns: f64,
    /// Spans with error status in the window
    pub error_count: u64,
}
