//! OTLP collector service
//!
//! Receives OTLP traces, metrics, and logs over gRPC and HTTP, batches
//! them through the worker pool, and writes them to ClickHouse.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use futures::future::join_all;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use otelhouse::config::ConfigLoader;
use otelhouse::monitoring::{self, HealthState};
use otelhouse::otlp::{grpc, http, IngestQueues};
use otelhouse::pipeline::{signal_queue, spawn_workers, WorkerConfig};
use otelhouse::storage::{ClickHouseClient, LogSink, MetricSink, SpanSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "configs/collector.yaml".to_string());
    let config = ConfigLoader::load_or_default(&config_path)?;

    monitoring::init_logging(&config.monitoring.log_level, &config.monitoring.log_format);
    let prometheus = monitoring::install_metrics()?;

    let client = Arc::new(ClickHouseClient::new(&config.clickhouse)?);
    client.ping().await.context("ClickHouse ping failed")?;

    let health = HealthState::new();
    let shutdown = CancellationToken::new();

    // One bounded queue and worker pool per signal
    let (span_tx, span_rx) = signal_queue("spans", config.performance.queue_size);
    let (metric_tx, metric_rx) = signal_queue("metrics", config.performance.queue_size);
    let (log_tx, log_rx) = signal_queue("logs", config.performance.queue_size);

    let worker_config = WorkerConfig::from(&config.performance);
    let worker_count = config.performance.worker_count;
    let mut workers = Vec::new();
    workers.extend(spawn_workers(
        worker_count,
        span_rx,
        Arc::new(SpanSink::new(client.clone())),
        worker_config.clone(),
        shutdown.clone(),
    ));
    workers.extend(spawn_workers(
        worker_count,
        metric_rx,
        Arc::new(MetricSink::new(client.clone())),
        worker_config.clone(),
        shutdown.clone(),
    ));
    workers.extend(spawn_workers(
        worker_count,
        log_rx,
        Arc::new(LogSink::new(client.clone())),
        worker_config,
        shutdown.clone(),
    ));

    let queues = IngestQueues {
        spans: span_tx,
        metrics: metric_tx,
        logs: log_tx,
    };

    if config.otlp.enable_grpc {
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.otlp.grpc_port)
            .parse()
            .context("invalid OTLP gRPC address")?;
        let queues = queues.clone();
        let max_msg_bytes = config.otlp.max_recv_msg_bytes();
        let token = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = grpc::serve(addr, queues, max_msg_bytes, token).await {
                error!(error = %e, "OTLP gRPC receiver failed");
            }
        });
    }

    if config.otlp.enable_http {
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.otlp.http_port)
            .parse()
            .context("invalid OTLP HTTP address")?;
        let router = http::router(queues.clone(), config.otlp.max_recv_msg_bytes());
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("failed to bind OTLP HTTP listener")?;
        let token = shutdown.clone();
        info!(%addr, "starting OTLP HTTP receiver");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "OTLP HTTP receiver failed");
            }
        });
    }

    // Health probes on the server port, Prometheus scrape on its own port
    let health_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid health server address")?;
    let health_router = monitoring::health_router(
        health.clone(),
        &config.monitoring.health_check_path,
        &config.monitoring.ready_check_path,
    );
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .context("failed to bind health listener")?;
    let token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(health_listener, health_router)
            .with_graceful_shutdown(token.cancelled_owned())
            .await
        {
            error!(error = %e, "health server failed");
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
    info!(
        grpc_port = config.otlp.grpc_port,
        http_port = config.otlp.http_port,
        "OTLP collector started"
    );

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }

    info!("shutting down gracefully");
    health.set_ready(false);
    shutdown.cancel();

    // Workers flush their accumulators on the way out; past the
    // deadline the remaining batches are abandoned
    if tokio::time::timeout(config.server.shutdown_timeout(), join_all(workers))
        .await
        .is_err()
    {
        warn!("shutdown deadline elapsed, dropping remaining batches");
    }
    client.close();

    info!("shutdown complete");
    Ok(())
}
