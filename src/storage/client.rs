//! ClickHouse client over the HTTP interface
//!
//! Inserts ship zstd-compressed JSONEachRow bodies; queries use
//! server-side bound parameters (`{name:Type}` placeholders with
//! `param_*` form fields) so caller input never reaches the SQL text.
//! The client is re-entrant and shared across workers and query
//! handlers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::config::ClickHouseConfig;
use crate::error::StorageError;
use crate::models::{LogRecord, Metric, Span};
use crate::pipeline::BatchSink;
use crate::storage::rows;

/// Wire compression level for insert bodies
const ZSTD_LEVEL: i32 = 3;

/// Statement execution ceiling, matching the server-side setting the
/// original deployment used
const MAX_EXECUTION_TIME_SECS: &str = "60";

/// Exception codes worth retrying: timeouts, overload, memory
/// pressure, too many parts
const RETRIABLE_EXCEPTION_CODES: &[i32] = &[159, 202, 209, 210, 241, 252];

/// Shared ClickHouse connection handle
#[derive(Debug)]
pub struct ClickHouseClient {
    http: reqwest::Client,
    endpoints: Vec<String>,
    database: String,
    username: String,
    password: String,
    /// Caps in-flight requests; closed on shutdown
    permits: Arc<Semaphore>,
    cursor: AtomicUsize,
}

impl ClickHouseClient {
    /// Build a client from the connection settings
    pub fn new(config: &ClickHouseConfig) -> Result<Self, StorageError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.dial_timeout())
            .pool_max_idle_per_host(config.max_idle_conns)
            .pool_idle_timeout(config.conn_max_lifetime());
        if config.tls_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| StorageError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoints: config
                .addresses
                .iter()
                .map(|a| a.trim_end_matches('/').to_string())
                .collect(),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            permits: Arc::new(Semaphore::new(config.max_open_conns)),
            cursor: AtomicUsize::new(0),
        })
    }

    /// Verify connectivity
    pub async fn ping(&self) -> Result<(), StorageError> {
        self.run_query("SELECT 1", &[]).await.map(|_| ())
    }

    /// Stop accepting new statements; in-flight calls finish, later
    /// calls observe a cancellation
    pub fn close(&self) {
        self.permits.close();
    }

    /// Insert a batch of spans into `otel_traces`
    pub async fn insert_spans(&self, spans: &[Span]) -> Result<(), StorageError> {
        self.run_insert(&rows::insert_spans_sql(), spans.iter().map(rows::span_row))
            .await
    }

    /// Insert a batch of metrics into `otel_metrics`
    pub async fn insert_metrics(&self, metrics: &[Metric]) -> Result<(), StorageError> {
        self.run_insert(
            &rows::insert_metrics_sql(),
            metrics.iter().map(rows::metric_row),
        )
        .await
    }

    /// Insert a batch of logs into `otel_logs`
    pub async fn insert_logs(&self, logs: &[LogRecord]) -> Result<(), StorageError> {
        self.run_insert(&rows::insert_logs_sql(), logs.iter().map(rows::log_row))
            .await
    }

    /// Run a SELECT and decode each JSONEachRow line into `T`
    ///
    /// A row that fails to decode is logged and skipped; a failed
    /// statement fails the whole call.
    pub async fn query_rows<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[(String, String)],
    ) -> Result<Vec<T>, StorageError> {
        let body = self.run_query(sql, params).await?;
        let mut out = Vec::new();
        for line in body.lines().filter(|l| !l.is_empty()) {
            match serde_json::from_str::<T>(line) {
                Ok(row) => out.push(row),
                Err(e) => warn!(error = %e, "skipping undecodable row"),
            }
        }
        Ok(out)
    }

    async fn run_insert(
        &self,
        sql: &str,
        row_iter: impl Iterator<Item = serde_json::Value>,
    ) -> Result<(), StorageError> {
        let mut body = Vec::new();
        for row in row_iter {
            serde_json::to_writer(&mut body, &row)
                .map_err(|e| StorageError::Decode(format!("row encoding failed: {e}")))?;
            body.push(b'\n');
        }
        // Empty batch: success without touching the store
        if body.is_empty() {
            return Ok(());
        }

        let compressed = zstd::encode_all(&body[..], ZSTD_LEVEL)
            .map_err(|e| StorageError::Transport(format!("zstd encoding failed: {e}")))?;

        let request = self
            .request_base()
            .query(&[("query", sql)])
            .header(reqwest::header::CONTENT_ENCODING, "zstd")
            .body(compressed);
        self.execute(request).await.map(|_| ())
    }

    async fn run_query(
        &self,
        sql: &str,
        params: &[(String, String)],
    ) -> Result<String, StorageError> {
        let mut request = self.request_base().query(&[
            ("default_format", "JSONEachRow"),
            // Keep UInt64 columns as JSON numbers, not strings
            ("output_format_json_quote_64bit_integers", "0"),
        ]);
        for (name, value) in params {
            request = request.query(&[(format!("param_{name}"), value)]);
        }
        self.execute(request.body(sql.to_string())).await
    }

    fn request_base(&self) -> reqwest::RequestBuilder {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed);
        let endpoint = &self.endpoints[index % self.endpoints.len()];
        let mut request = self
            .http
            .post(endpoint)
            .query(&[
                ("database", self.database.as_str()),
                ("max_execution_time", MAX_EXECUTION_TIME_SECS),
            ])
            .header("X-ClickHouse-User", &self.username);
        if !self.password.is_empty() {
            request = request.header("X-ClickHouse-Key", &self.password);
        }
        request
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<String, StorageError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| StorageError::Canceled)?;

        let response = request
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        let status = response.status();
        let exception_code = response
            .headers()
            .get("x-clickhouse-exception-code")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<i32>().ok())
            .unwrap_or(0);
        let body = response
            .text()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(StorageError::Server {
                code: exception_code,
                message: truncate(&body, 512),
                retriable: RETRIABLE_EXCEPTION_CODES.contains(&exception_code),
            })
        }
    }
}

fn truncate(message: &str, limit: usize) -> String {
    let trimmed = message.trim();
    if trimmed.len() <= limit {
        trimmed.to_string()
    } else {
        let mut end = limit;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    }
}

/// Span batch sink backed by `otel_traces`
pub struct SpanSink {
    client: Arc<ClickHouseClient>,
}

impl SpanSink {
    /// Wrap the shared client
    pub fn new(client: Arc<ClickHouseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BatchSink<Span> for SpanSink {
    fn table(&self) -> &'static str {
        rows::SPANS_TABLE
    }

    async fn insert(&self, batch: &[Span]) -> Result<(), StorageError> {
        self.client.insert_spans(batch).await
    }
}

/// Metric batch sink backed by `otel_metrics`
pub struct MetricSink {
    client: Arc<ClickHouseClient>,
}

impl MetricSink {
    /// Wrap the shared client
    pub fn new(client: Arc<ClickHouseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BatchSink<Metric> for MetricSink {
    fn table(&self) -> &'static str {
        rows::METRICS_TABLE
    }

    async fn insert(&self, batch: &[Metric]) -> Result<(), StorageError> {
        self.client.insert_metrics(batch).await
    }
}

/// Log batch sink backed by `otel_logs`
pub struct LogSink {
    client: Arc<ClickHouseClient>,
}

impl LogSink {
    /// Wrap the shared client
    pub fn new(client: Arc<ClickHouseClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl BatchSink<LogRecord> for LogSink {
    fn table(&self) -> &'static str {
        rows::LOGS_TABLE
    }

    async fn insert(&self, batch: &[LogRecord]) -> Result<(), StorageError> {
        self.client.insert_logs(batch).await
    }
}
