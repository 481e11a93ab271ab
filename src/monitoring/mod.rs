//! Process observability: logging, self-metrics, health probes

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;

use crate::error::ServerError;

/// Metric names shared by the collector and query services
pub mod names {
    /// Spans accepted into the ingest queue, labeled by service
    pub const RECEIVED_SPANS: &str = "otel_received_spans_total";
    /// Metric points accepted into the ingest queue, labeled by service
    pub const RECEIVED_METRICS: &str = "otel_received_metrics_total";
    /// Log records accepted into the ingest queue, labeled by service
    pub const RECEIVED_LOGS: &str = "otel_received_logs_total";
    /// Records dropped by a full queue, labeled by signal
    pub const QUEUE_DROPPED: &str = "otel_queue_dropped_total";
    /// Records skipped by the decoder, labeled by signal
    pub const INVALID_RECORDS: &str = "otel_invalid_records_total";
    /// Current queue depth, labeled by signal
    pub const QUEUE_SIZE: &str = "otel_queue_size";
    /// Storage write outcomes, labeled by table and status
    pub const STORAGE_WRITES: &str = "otel_storage_writes_total";
    /// Storage write latency, labeled by table
    pub const STORAGE_WRITE_DURATION: &str = "otel_storage_write_duration_seconds";
    /// Flushed batch sizes, labeled by signal
    pub const BATCH_SIZE: &str = "otel_batch_size";
    /// Query handler latency, labeled by query type
    pub const QUERY_DURATION: &str = "otel_query_duration_seconds";
    /// Query handler failures, labeled by query type
    pub const QUERY_ERRORS: &str = "otel_query_errors_total";
}

/// Initialize structured logging
///
/// `RUST_LOG` wins over the configured level when set. Safe to call
/// repeatedly; later calls are no-ops.
pub fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    if format == "json" {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }
}

/// Install the process-wide Prometheus recorder and register metric
/// descriptions
///
/// Returns the handle used to render the scrape payload.
pub fn install_metrics() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(names::STORAGE_WRITE_DURATION.to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .map_err(|e| ServerError::MetricsInstall(e.to_string()))?
        .set_buckets_for_metric(
            Matcher::Full(names::BATCH_SIZE.to_string()),
            &[10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0, 50000.0],
        )
        .map_err(|e| ServerError::MetricsInstall(e.to_string()))?
        .set_buckets_for_metric(
            Matcher::Full(names::QUERY_DURATION.to_string()),
            &[0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0],
        )
        .map_err(|e| ServerError::MetricsInstall(e.to_string()))?
        .install_recorder()
        .map_err(|e| ServerError::MetricsInstall(e.to_string()))?;

    describe_counter!(names::RECEIVED_SPANS, "Total number of spans received");
    describe_counter!(names::RECEIVED_METRICS, "Total number of metrics received");
    describe_counter!(names::RECEIVED_LOGS, "Total number of logs received");
    describe_counter!(
        names::QUEUE_DROPPED,
        "Total number of records dropped by full queues"
    );
    describe_counter!(
        names::INVALID_RECORDS,
        "Total number of malformed records skipped by the decoder"
    );
    describe_gauge!(names::QUEUE_SIZE, "Current size of processing queues");
    describe_counter!(
        names::STORAGE_WRITES,
        "Total number of storage write operations"
    );
    describe_histogram!(
        names::STORAGE_WRITE_DURATION,
        "Duration of storage write operations"
    );
    describe_histogram!(names::BATCH_SIZE, "Size of batches sent to storage");
    describe_histogram!(names::QUERY_DURATION, "Duration of query operations");
    describe_counter!(names::QUERY_ERRORS, "Total number of query errors");

    Ok(handle)
}

/// Router serving the Prometheus scrape payload at `path`
pub fn metrics_router(handle: PrometheusHandle, path: &str) -> Router {
    Router::new().route(path, get(move || std::future::ready(handle.render())))
}

/// Readiness flag shared between the shutdown sequence and the probe
/// handlers
#[derive(Debug, Clone, Default)]
pub struct HealthState {
    ready: Arc<AtomicBool>,
}

impl HealthState {
    /// Create a not-ready state
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish readiness; idempotent
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Current readiness
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Router serving the liveness and readiness probes at the configured
/// paths
pub fn health_router(state: HealthState, health_path: &str, ready_path: &str) -> Router {
    Router::new()
        .route(health_path, get(liveness))
        .route(ready_path, get(readiness))
        .with_state(state)
}

async fn liveness() -> &'static str {
    "OK"
}

async fn readiness(State(state): State<HealthState>) -> (StatusCode, &'static str) {
    if state.is_ready() {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not Ready")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_state_publishes_atomically() {
        let state = HealthState::new();
        assert!(!state.is_ready());
        state.set_ready(true);
        state.set_ready(true);
        assert!(state.is_ready());
        state.set_ready(false);
        assert!(!state.is_ready());
    }

    #[test]
    fn logging_init_is_repeat_safe() {
        init_logging("info", "text");
        init_logging("debug", "json");
    }
}
