//! OTLP ingestion and query services backed by ClickHouse
//!
//! The ingest path decodes OTLP export requests (gRPC and HTTP) into a
//! normalized row model, buffers records through bounded per-signal
//! queues, batches them in a worker pool, and writes columnar inserts
//! to ClickHouse. The query path serves time-range trace, metric, and
//! log queries, transparently routing metrics to the raw table or a
//! rollup depending on the window age.
//!
//! # Services
//!
//! - `collector`: OTLP/gRPC on 4317 and OTLP/HTTP on 4318, batching
//!   pipeline, ClickHouse writer, health and metrics endpoints
//! - `query-api`: JSON query API under `/api/v1`, health and metrics
//!   endpoints

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod models;
pub mod monitoring;
pub mod otlp;
pub mod pipeline;
pub mod query;
pub mod storage;

pub use config::{Config, ConfigLoader};
pub use error::{ConfigError, ServerError, StorageError};
pub use storage::ClickHouseClient;
