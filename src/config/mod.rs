//! Configuration loading and validation

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::{
    ClickHouseConfig, Config, MonitoringConfig, OtlpConfig, PerformanceConfig, ServerConfig,
};
