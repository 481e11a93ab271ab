//! Pipeline tests: queue hand-off, flush conditions, retry policy

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use otelhouse::error::StorageError;
use otelhouse::pipeline::{
    signal_queue, spawn_workers, BatchSink, RetryPolicy, WorkerConfig, ENQUEUE_TIMEOUT,
};

/// Records the size of every flushed batch
struct RecordingSink {
    batches: Mutex<Vec<usize>>,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Vec::new()),
        })
    }

    async fn batches(&self) -> Vec<usize> {
        self.batches.lock().await.clone()
    }
}

#[async_trait]
impl BatchSink<u64> for RecordingSink {
    fn table(&self) -> &'static str {
        "test_table"
    }

    async fn insert(&self, batch: &[u64]) -> Result<(), StorageError> {
        self.batches.lock().await.push(batch.len());
        Ok(())
    }
}

/// Fails every insert with a retriable error, recording attempt times
struct FailingSink {
    attempts: Mutex<Vec<Instant>>,
}

impl FailingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            attempts: Mutex::new(Vec::new()),
        })
    }

    async fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().await.clone()
    }
}

#[async_trait]
impl BatchSink<u64> for FailingSink {
    fn table(&self) -> &'static str {
        "test_table"
    }

    async fn insert(&self, _batch: &[u64]) -> Result<(), StorageError> {
        self.attempts.lock().await.push(Instant::now());
        Err(StorageError::Transport("connection refused".to_string()))
    }
}

fn worker_config(batch_size: usize, batch_timeout: Duration) -> WorkerConfig {
    WorkerConfig {
        batch_size,
        batch_timeout,
        retry: RetryPolicy {
            max_attempts: 1,
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(100),
        },
    }
}

#[tokio::test]
async fn record_in_nonfull_queue_is_dequeued_exactly_once() {
    let (tx, rx) = signal_queue::<u64>("spans", 16);
    assert!(tx.enqueue(7).await, "non-full queue accepts the record");

    assert_eq!(rx.recv().await, Some(7));

    // Nothing left: a second receive must park
    let second = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(second.is_err(), "record must not be delivered twice");
}

#[tokio::test]
async fn full_queue_drops_after_the_bounded_wait() {
    assert_eq!(ENQUEUE_TIMEOUT, Duration::from_millis(100));

    let (tx, _rx) = signal_queue::<u64>("spans", 1);
    assert!(tx.enqueue(1).await);

    let started = Instant::now();
    let accepted = tx.enqueue(2).await;
    let waited = started.elapsed();

    assert!(!accepted, "full queue drops the record");
    assert!(
        waited >= Duration::from_millis(90),
        "drop only after the hand-off wait, waited {waited:?}"
    );
    assert!(waited < Duration::from_millis(500));
}

#[tokio::test]
async fn batches_flush_at_the_size_threshold() {
    let (tx, rx) = signal_queue::<u64>("spans", 64);
    let sink = RecordingSink::new();
    let shutdown = CancellationToken::new();
    let workers = spawn_workers(
        1,
        rx,
        sink.clone(),
        worker_config(3, Duration::from_secs(10)),
        shutdown.clone(),
    );

    for i in 0..7 {
        assert!(tx.enqueue(i).await);
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(sink.batches().await, vec![3, 3], "two full batches flush");

    // Shutdown flushes the remainder before the worker exits
    shutdown.cancel();
    for worker in workers {
        worker.await.expect("worker exits cleanly");
    }
    assert_eq!(sink.batches().await, vec![3, 3, 1]);
}

#[tokio::test]
async fn partial_batches_flush_on_the_timeout() {
    let (tx, rx) = signal_queue::<u64>("spans", 64);
    let sink = RecordingSink::new();
    let shutdown = CancellationToken::new();
    let _workers = spawn_workers(
        1,
        rx,
        sink.clone(),
        worker_config(1000, Duration::from_millis(500)),
        shutdown.clone(),
    );

    assert!(tx.enqueue(1).await);
    assert!(tx.enqueue(2).await);

    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(
        sink.batches().await,
        vec![2],
        "a single flush of both records within the timeout window"
    );
}

#[tokio::test]
async fn closing_the_queue_drains_the_accumulator() {
    let (tx, rx) = signal_queue::<u64>("spans", 64);
    let sink = RecordingSink::new();
    let shutdown = CancellationToken::new();
    let workers = spawn_workers(
        1,
        rx,
        sink.clone(),
        worker_config(100, Duration::from_secs(10)),
        shutdown.clone(),
    );

    assert!(tx.enqueue(1).await);
    assert!(tx.enqueue(2).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(tx);

    for worker in workers {
        worker.await.expect("worker exits once the queue closes");
    }
    assert_eq!(sink.batches().await, vec![2]);
}

#[tokio::test]
async fn retries_back_off_exponentially_then_drop_the_batch() {
    let (tx, rx) = signal_queue::<u64>("spans", 16);
    let sink = FailingSink::new();
    let shutdown = CancellationToken::new();
    let _workers = spawn_workers(
        1,
        rx,
        sink.clone(),
        WorkerConfig {
            batch_size: 1,
            batch_timeout: Duration::from_secs(10),
            retry: RetryPolicy {
                max_attempts: 3,
                initial_interval: Duration::from_secs(1),
                max_interval: Duration::from_secs(30),
            },
        },
        shutdown.clone(),
    );

    assert!(tx.enqueue(1).await);

    // Attempts land at ~0s, ~1s, ~3s; wait past the last one
    tokio::time::sleep(Duration::from_millis(4200)).await;
    let attempts = sink.attempts().await;
    assert_eq!(attempts.len(), 3, "attempt count capped at retry_max_attempts");

    let first_gap = attempts[1] - attempts[0];
    let second_gap = attempts[2] - attempts[1];
    assert!(
        first_gap >= Duration::from_millis(950) && first_gap < Duration::from_millis(1600),
        "first backoff near the initial interval, got {first_gap:?}"
    );
    assert!(
        second_gap >= Duration::from_millis(1900) && second_gap < Duration::from_millis(3000),
        "second backoff doubled, got {second_gap:?}"
    );

    // The batch was dropped: no further attempts arrive
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(sink.attempts().await.len(), 3);
}

#[tokio::test]
async fn worker_resumes_draining_after_dropping_a_batch() {
    let (tx, rx) = signal_queue::<u64>("spans", 16);

    /// Fails the first insert fatally, then records sizes
    struct FlakySink {
        failed_once: Mutex<bool>,
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl BatchSink<u64> for FlakySink {
        fn table(&self) -> &'static str {
            "test_table"
        }

        async fn insert(&self, batch: &[u64]) -> Result<(), StorageError> {
            let mut failed = self.failed_once.lock().await;
            if !*failed {
                *failed = true;
                return Err(StorageError::Server {
                    code: 53,
                    message: "type mismatch".to_string(),
                    retriable: false,
                });
            }
            self.batches.lock().await.push(batch.len());
            Ok(())
        }
    }

    let sink = Arc::new(FlakySink {
        failed_once: Mutex::new(false),
        batches: Mutex::new(Vec::new()),
    });
    let shutdown = CancellationToken::new();
    let _workers = spawn_workers(
        1,
        rx,
        sink.clone(),
        worker_config(1, Duration::from_secs(10)),
        shutdown.clone(),
    );

    assert!(tx.enqueue(1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(tx.enqueue(2).await);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The fatal batch is gone, the next one lands
    assert_eq!(sink.batches.lock().await.clone(), vec![1]);
}
