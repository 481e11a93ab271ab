//! Query API service
//!
//! Serves trace, metric, and log queries plus per-service statistics
//! over HTTP, reading from the same ClickHouse schema the collector
//! writes.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use otelhouse::config::ConfigLoader;
use otelhouse::monitoring::{self, HealthState};
use otelhouse::query::{self, QueryState};
use otelhouse::storage::ClickHouseClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "configs/query.yaml".to_string());
    let config = ConfigLoader::load_or_default(&config_path)?;

    monitoring::init_logging(&config.monitoring.log_level, &config.monitoring.log_format);
    let prometheus = monitoring::install_metrics()?;

    let client = Arc::new(ClickHouseClient::new(&config.clickhouse)?);
    client.ping().await.context("ClickHouse ping failed")?;

    let health = HealthState::new();
    let shutdown = CancellationToken::new();

    let app = query::router(QueryState {
        client: client.clone(),
    })
    .merge(monitoring::health_router(
        health.clone(),
        &config.monitoring.health_check_path,
        &config.monitoring.ready_check_path,
    ))
    .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind query API listener")?;
    let token = shutdown.clone();
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(token.cancelled_owned())
            .await
        {
            error!(error = %e, "query API server failed");
        }
    });

    let metrics_addr: SocketAddr =
        format!("{}:{}", config.server.host, config.monitoring.metrics_port)
            .parse()
            .context("invalid metrics server address")?;
    let metrics_router = monitoring::metrics_router(prometheus, &config.monitoring.metrics_path);
    let metrics_listener = tokio::net::TcpListener::bind(metrics_addr)
        .await
        .context("failed to bind metrics listener")?;
    let token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(metrics_listener, metrics_router)
            .with_graceful_shutdown(token.cancelled_owned())
            .await
        {
            error!(error = %e, "metrics server failed");
        }
    });

    health.set_ready(true);
    info!(port = config.server.port, "query API server started");

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }

    info!("shutting down gracefully");
    health.set_ready(false);
    shutdown.cancel();

    if tokio::time::timeout(config.server.shutdown_timeout(), server)
        .await
        .is_err()
    {
        warn!("shutdown deadline elapsed");
    }
    client.close();

    info!("shutdown complete");
    Ok(())
}
