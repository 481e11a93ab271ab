//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;

/// Main configuration structure shared by the collector and the query
/// API binaries
///
/// Every field has a default so a partial YAML document (or none at
/// all) yields a runnable local configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server settings (health endpoints, query API)
    #[serde(default)]
    pub server: ServerConfig,

    /// ClickHouse connection settings
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,

    /// OTLP receiver settings
    #[serde(default)]
    pub otlp: OtlpConfig,

    /// Logging and self-metrics settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,

    /// Batching, queueing, and retry settings
    #[serde(default)]
    pub performance: PerformanceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            clickhouse: ClickHouseConfig::default(),
            otlp: OtlpConfig::default(),
            monitoring: MonitoringConfig::default(),
            performance: PerformanceConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clickhouse.addresses.is_empty() {
            return Err(ConfigError::MissingRequiredField(
                "clickhouse.addresses".to_string(),
            ));
        }
        if self.clickhouse.addresses.iter().any(|a| a.is_empty()) {
            return Err(ConfigError::ValidationFailed(
                "clickhouse addresses cannot contain empty entries".to_string(),
            ));
        }
        if self.clickhouse.database.is_empty() {
            return Err(ConfigError::MissingRequiredField(
                "clickhouse.database".to_string(),
            ));
        }
        if self.clickhouse.max_open_conns == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_open_conns must be positive".to_string(),
            ));
        }
        if self.otlp.grpc_port == 0 || self.otlp.http_port == 0 {
            return Err(ConfigError::ValidationFailed(
                "OTLP ports must be non-zero".to_string(),
            ));
        }
        if self.otlp.enable_grpc && self.otlp.grpc_port == self.otlp.http_port {
            return Err(ConfigError::ValidationFailed(
                "OTLP gRPC and HTTP ports must differ".to_string(),
            ));
        }
        if self.performance.batch_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch size must be positive".to_string(),
            ));
        }
        if self.performance.batch_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed(
                "batch timeout must be positive".to_string(),
            ));
        }
        if self.performance.worker_count == 0 {
            return Err(ConfigError::ValidationFailed(
                "worker count must be positive".to_string(),
            ));
        }
        if self.performance.queue_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "queue size must be positive".to_string(),
            ));
        }
        if self.performance.retry_max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "retry_max_attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Bind host (default: 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port for health endpoints / query API (default: 8080)
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Graceful shutdown deadline in seconds (default: 30)
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_server_port(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl ServerConfig {
    /// Shutdown deadline as a [`Duration`]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// ClickHouse connection settings (HTTP interface)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClickHouseConfig {
    /// Server base URLs, tried round-robin (default: http://localhost:8123)
    #[serde(default = "default_clickhouse_addresses")]
    pub addresses: Vec<String>,

    /// Target database (default: otel)
    #[serde(default = "default_database")]
    pub database: String,

    /// Username (default: default)
    #[serde(default = "default_username")]
    pub username: String,

    /// Password (default: empty)
    #[serde(default)]
    pub password: String,

    /// Cap on in-flight requests to the store (default: 50)
    #[serde(default = "default_max_open_conns")]
    pub max_open_conns: usize,

    /// Idle connections kept per host (default: 5)
    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: usize,

    /// Idle connection recycle age in seconds (default: 3600)
    #[serde(default = "default_conn_max_lifetime_secs")]
    pub conn_max_lifetime_secs: u64,

    /// Connect timeout in seconds (default: 10)
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,

    /// Whether addresses use TLS (https scheme)
    #[serde(default)]
    pub tls_enabled: bool,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub tls_skip_verify: bool,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            addresses: default_clickhouse_addresses(),
            database: default_database(),
            username: default_username(),
            password: String::new(),
            max_open_conns: default_max_open_conns(),
            max_idle_conns: default_max_idle_conns(),
            conn_max_lifetime_secs: default_conn_max_lifetime_secs(),
            dial_timeout_secs: default_dial_timeout_secs(),
            tls_enabled: false,
            tls_skip_verify: false,
        }
    }
}

impl ClickHouseConfig {
    /// Connect timeout as a [`Duration`]
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    /// Connection recycle age as a [`Duration`]
    pub fn conn_max_lifetime(&self) -> Duration {
        Duration::from_secs(self.conn_max_lifetime_secs)
    }
}

/// OTLP receiver settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OtlpConfig {
    /// OTLP/gRPC port (default: 4317)
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,

    /// OTLP/HTTP port (default: 4318)
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Whether the gRPC receiver is enabled (default: true)
    #[serde(default = "default_true")]
    pub enable_grpc: bool,

    /// Whether the HTTP receiver is enabled (default: true)
    #[serde(default = "default_true")]
    pub enable_http: bool,

    /// Maximum accepted request size in MiB (default: 4)
    #[serde(default = "default_max_recv_msg_size_mb")]
    pub max_recv_msg_size_mb: usize,
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            grpc_port: default_grpc_port(),
            http_port: default_http_port(),
            enable_grpc: true,
            enable_http: true,
            max_recv_msg_size_mb: default_max_recv_msg_size_mb(),
        }
    }
}

impl OtlpConfig {
    /// Maximum accepted request size in bytes
    pub fn max_recv_msg_bytes(&self) -> usize {
        self.max_recv_msg_size_mb * 1024 * 1024
    }
}

/// Logging and self-metrics settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Prometheus exporter port (default: 9090)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Prometheus scrape path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,

    /// Default log level directive (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format: `json` or `text` (default: json)
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Liveness probe path (default: /health)
    #[serde(default = "default_health_check_path")]
    pub health_check_path: String,

    /// Readiness probe path (default: /ready)
    #[serde(default = "default_ready_check_path")]
    pub ready_check_path: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
            metrics_path: default_metrics_path(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            health_check_path: default_health_check_path(),
            ready_check_path: default_ready_check_path(),
        }
    }
}

/// Batching, queueing, and retry settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PerformanceConfig {
    /// Records per flushed batch (default: 10000)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Flush deadline for a partial batch in milliseconds (default: 10000)
    #[serde(default = "default_batch_timeout_ms")]
    pub batch_timeout_ms: u64,

    /// Worker tasks per signal (default: cores - 1, at least 1)
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Bounded queue capacity per signal (default: 100000)
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Maximum insert attempts per batch (default: 5)
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Initial retry backoff in milliseconds (default: 1000)
    #[serde(default = "default_retry_initial_interval_ms")]
    pub retry_initial_interval_ms: u64,

    /// Retry backoff cap in milliseconds (default: 30000)
    #[serde(default = "default_retry_max_interval_ms")]
    pub retry_max_interval_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_timeout_ms: default_batch_timeout_ms(),
            worker_count: default_worker_count(),
            queue_size: default_queue_size(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_initial_interval_ms: default_retry_initial_interval_ms(),
            retry_max_interval_ms: default_retry_max_interval_ms(),
        }
    }
}

impl PerformanceConfig {
    /// Flush deadline as a [`Duration`]
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Initial retry backoff as a [`Duration`]
    pub fn retry_initial_interval(&self) -> Duration {
        Duration::from_millis(self.retry_initial_interval_ms)
    }

    /// Retry backoff cap as a [`Duration`]
    pub fn retry_max_interval(&self) -> Duration {
        Duration::from_millis(self.retry_max_interval_ms)
    }
}

// Default value functions

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_clickhouse_addresses() -> Vec<String> {
    vec!["http://localhost:8123".to_string()]
}

fn default_database() -> String {
    "otel".to_string()
}

fn default_username() -> String {
    "default".to_string()
}

fn default_max_open_conns() -> usize {
    50
}

fn default_max_idle_conns() -> usize {
    5
}

fn default_conn_max_lifetime_secs() -> u64 {
    3600
}

fn default_dial_timeout_secs() -> u64 {
    10
}

fn default_grpc_port() -> u16 {
    4317
}

fn default_http_port() -> u16 {
    4318
}

fn default_true() -> bool {
    true
}

fn default_max_recv_msg_size_mb() -> usize {
    4
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_health_check_path() -> String {
    "/health".to_string()
}

fn default_ready_check_path() -> String {
    "/ready".to_string()
}

fn default_batch_size() -> usize {
    10_000
}

fn default_batch_timeout_ms() -> u64 {
    10_000
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(1).max(1))
        .unwrap_or(1)
}

fn default_queue_size() -> usize {
    100_000
}

fn default_retry_max_attempts() -> u32 {
    5
}

fn default_retry_initial_interval_ms() -> u64 {
    1_000
}

fn default_retry_max_interval_ms() -> u64 {
    30_000
}
