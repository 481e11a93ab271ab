//! HTTP handlers for the query API
//!
//! Bad envelopes surface as 400 with the decoder's message; store
//! failures as 500 with the query-error counter incremented. Rows that
//! fail to decode are logged and skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDateTime, Utc};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::TraceIndex;
use crate::monitoring::names;
use crate::query::envelopes::{
    LogResult, LogsQueryRequest, LogsQueryResponse, MetricDataPoint, MetricsQueryRequest,
    MetricsQueryResponse, ServiceStat, SpanResult, TraceQueryRequest, TraceQueryResponse,
};
use crate::query::planner;
use crate::storage::ClickHouseClient;

/// Shared state of the query service
#[derive(Clone)]
pub struct QueryState {
    /// Shared store client
    pub client: Arc<ClickHouseClient>,
}

/// Query API error
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request envelope was malformed
    #[error("{0}")]
    BadRequest(String),

    /// A downstream failure aborted the query
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Build the query API router
pub fn router(state: QueryState) -> Router {
    Router::new()
        .route("/api/v1/traces", post(query_traces))
        .route("/api/v1/metrics", post(query_metrics))
        .route("/api/v1/logs", post(query_logs))
        .route("/api/v1/services/stats", get(service_stats))
        .with_state(state)
}

/// Observes the handler duration on drop so error paths are counted too
struct QueryTimer {
    query_type: &'static str,
    started: Instant,
}

impl QueryTimer {
    fn new(query_type: &'static str) -> Self {
        Self {
            query_type,
            started: Instant::now(),
        }
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        histogram!(names::QUERY_DURATION, "query_type" => self.query_type)
            .record(self.started.elapsed().as_secs_f64());
    }
}

fn bad_request(query_type: &'static str, rejection: JsonRejection) -> ApiError {
    counter!(names::QUERY_ERRORS, "query_type" => query_type).increment(1);
    ApiError::BadRequest(rejection.body_text())
}

fn storage_failure(query_type: &'static str, error: crate::error::StorageError) -> ApiError {
    counter!(names::QUERY_ERRORS, "query_type" => query_type).increment(1);
    ApiError::Internal(error.to_string())
}

// Intermediate row shapes: DateTime64 columns arrive as strings in
// JSONEachRow and are converted while building the envelope.

#[derive(Debug, Deserialize)]
struct SpanRow {
    trace_id: String,
    span_id: String,
    parent_span_id: String,
    span_name: String,
    span_kind: String,
    start_time: String,
    end_time: String,
    duration_ns: u64,
    status_code: String,
    status_message: String,
    service_name: String,
    attributes: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct MetricRow {
    ts: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct LogRow {
    timestamp: String,
    severity_text: String,
    body: String,
    service_name: String,
    trace_id: String,
    span_id: String,
    attributes: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct TraceIndexRow {
    trace_id: String,
    min_timestamp: String,
    max_timestamp: String,
    service_names: Vec<String>,
    root_service_name: String,
    root_span_name: String,
    duration_ns: u64,
    span_count: u32,
    has_errors: u8,
}

fn parse_store_datetime(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl TraceIndexRow {
    fn into_index(self) -> Option<TraceIndex> {
        Some(TraceIndex {
            trace_id: self.trace_id,
            min_timestamp: parse_store_datetime(&self.min_timestamp)?,
            max_timestamp: parse_store_datetime(&self.max_timestamp)?,
            service_names: self.service_names,
            root_service_name: self.root_service_name,
            root_span_name: self.root_span_name,
            duration_ns: self.duration_ns,
            span_count: self.span_count,
            has_errors: self.has_errors != 0,
        })
    }
}

async fn query_traces(
    State(state): State<QueryState>,
    payload: Result<Json<TraceQueryRequest>, JsonRejection>,
) -> Result<Json<TraceQueryResponse>, ApiError> {
    let _timer = QueryTimer::new("traces");
    let Json(req) = payload.map_err(|r| bad_request("traces", r))?;

    let index_bounds = match req.trace_id.as_deref().filter(|id| !id.is_empty()) {
        Some(trace_id) => lookup_index_bounds(&state.client, trace_id).await,
        None => None,
    };

    let plan = planner::trace_query(&req, index_bounds);
    let rows: Vec<SpanRow> = state
        .client
        .query_rows(&plan.sql, &plan.params)
        .await
        .map_err(|e| storage_failure("traces", e))?;

    let spans: Vec<SpanResult> = rows
        .into_iter()
        .filter_map(|row| {
            let start_time = parse_store_datetime(&row.start_time);
            let end_time = parse_store_datetime(&row.end_time);
            match (start_time, end_time) {
                (Some(start_time), Some(end_time)) => Some(SpanResult {
                    trace_id: row.trace_id,
                    span_id: row.span_id,
                    parent_span_id: row.parent_span_id,
                    span_name: row.span_name,
                    span_kind: row.span_kind,
                    start_time,
                    end_time,
                    duration_ns: row.duration_ns,
                    status_code: row.status_code,
                    status_message: row.status_message,
                    service_name: row.service_name,
                    attributes: row.attributes,
                }),
                _ => {
                    warn!(trace_id = %row.trace_id, "skipping span row with unreadable timestamps");
                    None
                }
            }
        })
        .collect();

    let total = spans.len();
    Ok(Json(TraceQueryResponse { spans, total }))
}

/// Resolve the trace's recorded time window for partition pruning;
/// any miss or failure falls back to an unbounded scan
async fn lookup_index_bounds(
    client: &ClickHouseClient,
    trace_id: &str,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let plan = planner::trace_index_query(trace_id);
    match client.query_rows::<TraceIndexRow>(&plan.sql, &plan.params).await {
        Ok(rows) => rows
            .into_iter()
            .next()
            .and_then(TraceIndexRow::into_index)
            .map(|index| (index.min_timestamp, index.max_timestamp)),
        Err(e) => {
            debug!(trace_id, error = %e, "trace index lookup failed, scanning unbounded");
            None
        }
    }
}

async fn query_metrics(
    State(state): State<QueryState>,
    payload: Result<Json<MetricsQueryRequest>, JsonRejection>,
) -> Result<Json<MetricsQueryResponse>, ApiError> {
    let _timer = QueryTimer::new("metrics");
    let Json(req) = payload.map_err(|r| bad_request("metrics", r))?;

    let plan = planner::metrics_query(&req, Utc::now()).map_err(|e| {
        counter!(names::QUERY_ERRORS, "query_type" => "metrics").increment(1);
        ApiError::BadRequest(e.to_string())
    })?;

    let rows: Vec<MetricRow> = state
        .client
        .query_rows(&plan.sql, &plan.params)
        .await
        .map_err(|e| storage_failure("metrics", e))?;

    let data_points = rows
        .into_iter()
        .filter_map(|row| {
            parse_store_datetime(&row.ts).map(|timestamp| MetricDataPoint {
                timestamp,
                value: row.value,
            })
        })
        .collect();

    Ok(Json(MetricsQueryResponse {
        metric_name: req.metric_name,
        data_points,
    }))
}

async fn query_logs(
    State(state): State<QueryState>,
    payload: Result<Json<LogsQueryRequest>, JsonRejection>,
) -> Result<Json<LogsQueryResponse>, ApiError> {
    let _timer = QueryTimer::new("logs");
    let Json(req) = payload.map_err(|r| bad_request("logs", r))?;

    let plan = planner::logs_query(&req);
    let rows: Vec<LogRow> = state
        .client
        .query_rows(&plan.sql, &plan.params)
        .await
        .map_err(|e| storage_failure("logs", e))?;

    let logs: Vec<LogResult> = rows
        .into_iter()
        .filter_map(|row| {
            parse_store_datetime(&row.timestamp).map(|timestamp| LogResult {
                timestamp,
                severity_text: row.severity_text,
                body: row.body,
                service_name: row.service_name,
                trace_id: row.trace_id,
                span_id: row.span_id,
                attributes: row.attributes,
            })
        })
        .collect();

    let total = logs.len();
    Ok(Json(LogsQueryResponse { logs, total }))
}

async fn service_stats(
    State(state): State<QueryState>,
) -> Result<Json<Vec<ServiceStat>>, ApiError> {
    let _timer = QueryTimer::new("service_stats");

    let plan = planner::service_stats_query();
    let stats: Vec<ServiceStat> = state
        .client
        .query_rows(&plan.sql, &plan.params)
        .await
        .map_err(|e| storage_failure("service_stats", e))?;

    Ok(Json(stats))
}
