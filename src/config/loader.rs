//! Configuration loader
//!
//! Loads configuration from a YAML file, then applies environment
//! variable overrides. Priority: environment > file > defaults.

use std::env;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::types::Config;
use crate::error::ConfigError;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file, apply env overrides, validate
    pub fn from_yaml(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        info!(config_path = %path.display(), "Loading configuration");

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
                path: path.display().to_string(),
                source: e,
            })?;

        let mut config: Config = serde_yaml::from_str(&content)?;
        debug!(config_path = %path.display(), "Parsed YAML configuration");

        Self::apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when the file exists, otherwise fall back to
    /// defaults (still honoring environment overrides)
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_yaml(path)
        } else {
            warn!(
                config_path = %path.display(),
                "Config file not found, using defaults"
            );
            let mut config = Config::default();
            Self::apply_env_overrides(&mut config);
            config.validate()?;
            Ok(config)
        }
    }

    /// Apply environment variable overrides to specific fields
    pub fn apply_env_overrides(config: &mut Config) {
        if let Ok(val) = env::var("CLICKHOUSE_HOST") {
            if !val.is_empty() {
                config.clickhouse.addresses = vec![val];
            }
        }
        if let Ok(val) = env::var("CLICKHOUSE_DATABASE") {
            if !val.is_empty() {
                config.clickhouse.database = val;
            }
        }
        if let Ok(val) = env::var("CLICKHOUSE_USERNAME") {
            if !val.is_empty() {
                config.clickhouse.username = val;
            }
        }
        if let Ok(val) = env::var("CLICKHOUSE_PASSWORD") {
            if !val.is_empty() {
                config.clickhouse.password = val;
            }
        }
        if let Ok(val) = env::var("LOG_LEVEL") {
            if !val.is_empty() {
                config.monitoring.log_level = val;
            }
        }
        if let Ok(val) = env::var("OTLP_GRPC_PORT") {
            match val.parse() {
                Ok(port) => config.otlp.grpc_port = port,
                Err(_) => warn!(value = %val, "Ignoring invalid OTLP_GRPC_PORT"),
            }
        }
        if let Ok(val) = env::var("OTLP_HTTP_PORT") {
            match val.parse() {
                Ok(port) => config.otlp.http_port = port,
                Err(_) => warn!(value = %val, "Ignoring invalid OTLP_HTTP_PORT"),
            }
        }
    }
}
