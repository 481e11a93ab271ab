//! Error types for the ingestion and query services
//!
//! Errors are grouped by the subsystem that produces them. The storage
//! error carries the retriable/fatal distinction the batch workers use
//! to decide between backing off and dropping a batch.

use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        /// Path that was attempted
        path: String,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Configuration file could not be parsed
    #[error("Failed to parse YAML: {0}")]
    ParseFailed(#[from] serde_yaml::Error),

    /// Missing required configuration field
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors returned by the ClickHouse client
#[derive(Error, Debug)]
pub enum StorageError {
    /// Connection, TLS, or timeout failure before a server response
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server rejected the statement
    #[error("server exception {code}: {message}")]
    Server {
        /// ClickHouse exception code (0 when the header is absent)
        code: i32,
        /// Exception text from the response body
        message: String,
        /// Whether the exception is worth retrying
        retriable: bool,
    },

    /// A fetched row could not be decoded
    #[error("row decode failure: {0}")]
    Decode(String),

    /// The operation was canceled before completion
    #[error("operation canceled")]
    Canceled,
}

impl StorageError {
    /// Whether the batch workers should retry the write
    pub fn is_retriable(&self) -> bool {
        match self {
            StorageError::Transport(_) => true,
            StorageError::Server { retriable, .. } => *retriable,
            StorageError::Decode(_) | StorageError::Canceled => false,
        }
    }
}

/// Server-related errors
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid listen address
    #[error("Invalid listen address {addr}: {reason}")]
    InvalidAddress {
        /// Address that failed to parse
        addr: String,
        /// Parse failure detail
        reason: String,
    },

    /// Failed to bind or serve
    #[error("Failed to start server: {0}")]
    StartupError(String),

    /// Metrics recorder could not be installed
    #[error("Failed to install metrics recorder: {0}")]
    MetricsInstall(String),
}
