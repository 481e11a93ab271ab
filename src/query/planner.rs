//! SQL planning for the query API
//!
//! Builds statements with server-side bound parameters: caller input
//! travels as `param_*` values against `{name:Type}` placeholders and
//! never reaches the SQL text. Limits are validated integers rendered
//! inline. Metrics queries are routed to the raw table or a rollup
//! based on the age of the requested window.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::query::envelopes::{LogsQueryRequest, MetricsQueryRequest, TraceQueryRequest};
use crate::storage::format_datetime;

/// Default row limit for trace and log queries
pub const DEFAULT_LIMIT: u32 = 100;

/// Planning failures, surfaced to the caller as bad requests
#[derive(Debug, Error)]
pub enum PlanError {
    /// The requested aggregation is not supported
    #[error("invalid aggregation {0:?}: expected avg, min, max, or sum")]
    InvalidAggregation(String),
}

/// A statement plus its bound parameters
#[derive(Debug, Clone)]
pub struct SqlQuery {
    /// Statement text with `{name:Type}` placeholders
    pub sql: String,
    /// Parameter name/value pairs, sent as `param_<name>` fields
    pub params: Vec<(String, String)>,
}

impl SqlQuery {
    fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    fn filter(&mut self, clause: &str, name: &str, value: String) {
        self.sql.push_str(clause);
        self.params.push((name.to_string(), value));
    }
}

/// Supported metric aggregations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    /// Arithmetic mean
    Avg,
    /// Minimum
    Min,
    /// Maximum
    Max,
    /// Sum
    Sum,
}

impl Aggregation {
    /// Parse the request field; absent defaults to `avg`
    pub fn parse(value: Option<&str>) -> Result<Self, PlanError> {
        match value {
            None | Some("") | Some("avg") => Ok(Aggregation::Avg),
            Some("min") => Ok(Aggregation::Min),
            Some("max") => Ok(Aggregation::Max),
            Some("sum") => Ok(Aggregation::Sum),
            Some(other) => Err(PlanError::InvalidAggregation(other.to_string())),
        }
    }

    fn func(&self) -> &'static str {
        match self {
            Aggregation::Avg => "avg",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Sum => "sum",
        }
    }

    fn rollup_column(&self) -> &'static str {
        match self {
            Aggregation::Avg => "value_avg",
            Aggregation::Min => "value_min",
            Aggregation::Max => "value_max",
            Aggregation::Sum => "value_sum",
        }
    }
}

/// Physical table serving a metrics window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsTable {
    /// Raw data points, windows younger than 30 days
    Raw,
    /// 5-minute rollup, windows between 30 and 90 days old
    Rollup5m,
    /// 1-hour rollup, windows older than 90 days
    Rollup1h,
}

impl MetricsTable {
    /// Select the table for a window starting at `start`
    pub fn for_window(now: DateTime<Utc>, start: DateTime<Utc>) -> Self {
        let age = now.signed_duration_since(start);
        if age > Duration::days(90) {
            MetricsTable::Rollup1h
        } else if age > Duration::days(30) {
            MetricsTable::Rollup5m
        } else {
            MetricsTable::Raw
        }
    }

    /// Table name
    pub fn name(&self) -> &'static str {
        match self {
            MetricsTable::Raw => "otel_metrics",
            MetricsTable::Rollup5m => "otel_metrics_5m",
            MetricsTable::Rollup1h => "otel_metrics_1h",
        }
    }

    /// Aggregation expression for this table: raw data aggregates the
    /// value column, rollups re-aggregate their pre-aggregated columns
    pub fn value_expr(&self, aggregation: Aggregation) -> String {
        match self {
            MetricsTable::Raw => format!("{}(value)", aggregation.func()),
            MetricsTable::Rollup5m | MetricsTable::Rollup1h => {
                format!("{}({})", aggregation.func(), aggregation.rollup_column())
            }
        }
    }
}

/// Span scan for a trace query
///
/// `index_bounds` narrows the scan to the window recorded in the trace
/// index when a trace-id lookup resolved one.
pub fn trace_query(
    req: &TraceQueryRequest,
    index_bounds: Option<(DateTime<Utc>, DateTime<Utc>)>,
) -> SqlQuery {
    let mut query = SqlQuery::new(
        "SELECT trace_id, span_id, parent_span_id, span_name, span_kind, \
         start_time, end_time, duration_ns, status_code, status_message, \
         service_name, attributes \
         FROM otel_traces WHERE 1 = 1",
    );

    if let Some(trace_id) = non_empty(&req.trace_id) {
        query.filter(" AND trace_id = {trace_id:String}", "trace_id", trace_id);
    }
    if let Some(service_name) = non_empty(&req.service_name) {
        query.filter(
            " AND service_name = {service_name:String}",
            "service_name",
            service_name,
        );
    }
    if let Some(start_time) = req.start_time {
        query.filter(
            " AND timestamp >= {start_time:DateTime64(9)}",
            "start_time",
            format_datetime(start_time),
        );
    }
    if let Some(end_time) = req.end_time {
        query.filter(
            " AND timestamp <= {end_time:DateTime64(9)}",
            "end_time",
            format_datetime(end_time),
        );
    }
    if let Some((min, max)) = index_bounds {
        query.filter(
            " AND timestamp >= {index_min:DateTime64(9)}",
            "index_min",
            format_datetime(min),
        );
        query.filter(
            " AND timestamp <= {index_max:DateTime64(9)}",
            "index_max",
            format_datetime(max),
        );
    }
    if let Some(min_duration) = req.min_duration.filter(|d| *d > 0) {
        query.filter(
            " AND duration_ns >= {min_duration:UInt64}",
            "min_duration",
            min_duration.to_string(),
        );
    }
    if let Some(max_duration) = req.max_duration.filter(|d| *d > 0) {
        query.filter(
            " AND duration_ns <= {max_duration:UInt64}",
            "max_duration",
            max_duration.to_string(),
        );
    }

    query
        .sql
        .push_str(&format!(" ORDER BY timestamp DESC LIMIT {}", limit_of(req.limit)));
    query
}

/// Trace index lookup backing the scan-narrowing above
pub fn trace_index_query(trace_id: &str) -> SqlQuery {
    let mut query = SqlQuery::new(
        "SELECT trace_id, min_timestamp, max_timestamp, service_names, \
         root_service_name, root_span_name, duration_ns, span_count, has_errors \
         FROM otel_trace_index WHERE trace_id = {trace_id:String} LIMIT 1",
    );
    query
        .params
        .push(("trace_id".to_string(), trace_id.to_string()));
    query
}

/// Time-bucketed aggregation over the table matching the window age
///
/// Buckets are fixed at 5 minutes regardless of the source table.
pub fn metrics_query(
    req: &MetricsQueryRequest,
    now: DateTime<Utc>,
) -> Result<SqlQuery, PlanError> {
    let aggregation = Aggregation::parse(req.aggregation.as_deref())?;
    let table = MetricsTable::for_window(now, req.start_time);

    let mut query = SqlQuery::new(format!(
        "SELECT toStartOfInterval(timestamp, INTERVAL 5 MINUTE) AS ts, {} AS value \
         FROM {} WHERE metric_name = {{metric_name:String}} \
         AND timestamp >= {{start_time:DateTime64(9)}} \
         AND timestamp <= {{end_time:DateTime64(9)}}",
        table.value_expr(aggregation),
        table.name(),
    ));
    query
        .params
        .push(("metric_name".to_string(), req.metric_name.clone()));
    query
        .params
        .push(("start_time".to_string(), format_datetime(req.start_time)));
    query
        .params
        .push(("end_time".to_string(), format_datetime(req.end_time)));

    if let Some(service_name) = non_empty(&req.service_name) {
        query.filter(
            " AND service_name = {service_name:String}",
            "service_name",
            service_name,
        );
    }

    query.sql.push_str(" GROUP BY ts ORDER BY ts");
    Ok(query)
}

/// Log scan with accreted filters
pub fn logs_query(req: &LogsQueryRequest) -> SqlQuery {
    let mut query = SqlQuery::new(
        "SELECT timestamp, severity_text, body, service_name, trace_id, span_id, attributes \
         FROM otel_logs \
         WHERE timestamp >= {start_time:DateTime64(9)} \
         AND timestamp <= {end_time:DateTime64(9)}",
    );
    query
        .params
        .push(("start_time".to_string(), format_datetime(req.start_time)));
    query
        .params
        .push(("end_time".to_string(), format_datetime(req.end_time)));

    if let Some(service_name) = non_empty(&req.service_name) {
        query.filter(
            " AND service_name = {service_name:String}",
            "service_name",
            service_name,
        );
    }
    if let Some(severity) = non_empty(&req.severity) {
        query.filter(
            " AND severity_text = {severity:String}",
            "severity",
            severity,
        );
    }
    if let Some(trace_id) = non_empty(&req.trace_id) {
        query.filter(" AND trace_id = {trace_id:String}", "trace_id", trace_id);
    }
    if let Some(search_text) = non_empty(&req.search_text) {
        // Wildcards live in the bound value, not the statement
        query.filter(
            " AND body LIKE {search_text:String}",
            "search_text",
            format!("%{search_text}%"),
        );
    }

    query
        .sql
        .push_str(&format!(" ORDER BY timestamp DESC LIMIT {}", limit_of(req.limit)));
    query
}

/// Per-service span statistics over the last hour
pub fn service_stats_query() -> SqlQuery {
    SqlQuery::new(
        "SELECT service_name, count() AS span_count, \
         avg(duration_ns) AS avg_duration_ns, \
         quantile(0.95)(duration_ns) AS p95_duration_ns, \
         countIf(status_code = 'error') AS error_count \
         FROM otel_traces WHERE timestamp >= now() - INTERVAL 1 HOUR \
         GROUP BY service_name ORDER BY span_count DESC",
    )
}

fn limit_of(limit: Option<u32>) -> u32 {
    match limit {
        None | Some(0) => DEFAULT_LIMIT,
        Some(n) => n,
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}
