//! Batch worker pool
//!
//! Each signal gets a pool of identical workers draining the shared
//! queue. A worker owns a private accumulator and flushes it when it
//! reaches the batch size, when the batch timeout elapses, or on
//! shutdown. A failed write is retried with exponential backoff while
//! the worker stays committed to the batch; exhausting the attempts
//! drops the batch and the worker resumes draining.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, histogram};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::config::PerformanceConfig;
use crate::error::StorageError;
use crate::monitoring::names;
use crate::pipeline::queue::SharedReceiver;

/// Destination for flushed batches
///
/// Implemented by the ClickHouse client once per signal; test suites
/// substitute recording or failing stubs.
#[async_trait]
pub trait BatchSink<T>: Send + Sync + 'static {
    /// Target table, used for counter labels
    fn table(&self) -> &'static str;

    /// Write one batch; an empty batch must succeed without I/O
    async fn insert(&self, batch: &[T]) -> Result<(), StorageError>;
}

/// Retry policy for failed writes
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum insert attempts per batch
    pub max_attempts: u32,
    /// First backoff interval
    pub initial_interval: Duration,
    /// Backoff cap
    pub max_interval: Duration,
}

/// Per-worker batching parameters
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Flush when the accumulator reaches this size
    pub batch_size: usize,
    /// Flush a non-empty accumulator after this long
    pub batch_timeout: Duration,
    /// Retry policy for failed writes
    pub retry: RetryPolicy,
}

impl From<&PerformanceConfig> for WorkerConfig {
    fn from(perf: &PerformanceConfig) -> Self {
        Self {
            batch_size: perf.batch_size,
            batch_timeout: perf.batch_timeout(),
            retry: RetryPolicy {
                max_attempts: perf.retry_max_attempts,
                initial_interval: perf.retry_initial_interval(),
                max_interval: perf.retry_max_interval(),
            },
        }
    }
}

/// Spawn `count` workers draining `receiver` into `sink`
///
/// Workers share nothing but the queue and the shutdown token. Each
/// handle resolves once its worker has flushed and exited.
pub fn spawn_workers<T, S>(
    count: usize,
    receiver: SharedReceiver<T>,
    sink: Arc<S>,
    config: WorkerConfig,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>>
where
    T: Send + 'static,
    S: BatchSink<T>,
{
    (0..count)
        .map(|worker_id| {
            let receiver = receiver.clone();
            let sink = sink.clone();
            let config = config.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                worker_loop(worker_id, receiver, sink, config, shutdown).await;
            })
        })
        .collect()
}

async fn worker_loop<T, S>(
    worker_id: usize,
    receiver: SharedReceiver<T>,
    sink: Arc<S>,
    config: WorkerConfig,
    shutdown: CancellationToken,
) where
    T: Send + 'static,
    S: BatchSink<T>,
{
    let signal = receiver.signal();
    debug!(signal, worker_id, "batch worker started");

    let mut batch: Vec<T> = Vec::with_capacity(config.batch_size);
    let mut ticker = interval_at(Instant::now() + config.batch_timeout, config.batch_timeout);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                flush(signal, sink.as_ref(), &mut batch, &config.retry).await;
                debug!(signal, worker_id, "batch worker shutting down");
                return;
            }
            _ = ticker.tick() => {
                flush(signal, sink.as_ref(), &mut batch, &config.retry).await;
            }
            record = receiver.recv() => match record {
                Some(record) => {
                    if batch.is_empty() {
                        // Age the batch from its first record
                        ticker.reset();
                    }
                    batch.push(record);
                    if batch.len() >= config.batch_size {
                        flush(signal, sink.as_ref(), &mut batch, &config.retry).await;
                    }
                }
                None => {
                    flush(signal, sink.as_ref(), &mut batch, &config.retry).await;
                    debug!(signal, worker_id, "queue closed, batch worker exiting");
                    return;
                }
            },
        }
    }
}

/// Write the accumulator as one batch, retrying transient failures
///
/// The worker does not drain more records between attempts; a full
/// queue propagates back-pressure to the transports. The batch is
/// cleared on success, cancellation, a fatal error, or attempt
/// exhaustion.
async fn flush<T, S>(signal: &'static str, sink: &S, batch: &mut Vec<T>, retry: &RetryPolicy)
where
    S: BatchSink<T> + ?Sized,
{
    if batch.is_empty() {
        return;
    }

    let size = batch.len();
    let mut attempt: u32 = 0;
    let mut backoff = retry.initial_interval;

    loop {
        attempt += 1;
        let started = std::time::Instant::now();
        match sink.insert(batch).await {
            Ok(()) => {
                counter!(names::STORAGE_WRITES, "table" => sink.table(), "status" => "ok")
                    .increment(1);
                histogram!(names::STORAGE_WRITE_DURATION, "table" => sink.table())
                    .record(started.elapsed().as_secs_f64());
                histogram!(names::BATCH_SIZE, "signal" => signal).record(size as f64);
                debug!(signal, size, attempt, "batch flushed");
                batch.clear();
                return;
            }
            Err(StorageError::Canceled) => {
                debug!(signal, size, "write canceled, releasing batch");
                batch.clear();
                return;
            }
            Err(e) if e.is_retriable() && attempt < retry.max_attempts => {
                warn!(
                    signal,
                    size,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "retriable write failure, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2).min(retry.max_interval);
            }
            Err(e) => {
                error!(signal, size, attempt, error = %e, "dropping batch after write failure");
                counter!(names::STORAGE_WRITES, "table" => sink.table(), "status" => "error")
                    .increment(1);
                batch.clear();
                return;
            }
        }
    }
}
