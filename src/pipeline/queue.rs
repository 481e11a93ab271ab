//! Bounded per-signal ingress queues
//!
//! One queue per signal sits between the OTLP receivers and the batch
//! workers. Producers hand off with a bounded wait; when the wait
//! elapses the record is dropped and counted, so a slow store degrades
//! into drops rather than unbounded memory growth.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::monitoring::names;

/// Bounded hand-off wait before a record is dropped
pub const ENQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// Create a bounded queue for one signal
///
/// Returns the producer handle (clonable across transport handlers)
/// and the shared consumer handle for the worker pool.
pub fn signal_queue<T: Send>(
    signal: &'static str,
    capacity: usize,
) -> (SignalQueue<T>, SharedReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        SignalQueue { tx, signal },
        SharedReceiver {
            rx: Arc::new(Mutex::new(rx)),
            signal,
        },
    )
}

/// Producer side of a signal queue
#[derive(Debug, Clone)]
pub struct SignalQueue<T> {
    tx: mpsc::Sender<T>,
    signal: &'static str,
}

impl<T: Send> SignalQueue<T> {
    /// Hand off a record with a bounded wait
    ///
    /// Returns `true` when the record was accepted. On a full queue the
    /// wait is [`ENQUEUE_TIMEOUT`]; afterwards the record is dropped
    /// and the drop counter increments. Never fails the caller.
    pub async fn enqueue(&self, record: T) -> bool {
        match tokio::time::timeout(ENQUEUE_TIMEOUT, self.tx.send(record)).await {
            Ok(Ok(())) => {
                gauge!(names::QUEUE_SIZE, "signal" => self.signal).increment(1.0);
                true
            }
            Ok(Err(_)) => {
                // Consumers are gone (shutdown underway)
                counter!(names::QUEUE_DROPPED, "signal" => self.signal).increment(1);
                false
            }
            Err(_) => {
                warn!(signal = self.signal, "queue full, dropping record");
                counter!(names::QUEUE_DROPPED, "signal" => self.signal).increment(1);
                false
            }
        }
    }

}

/// Consumer side of a signal queue, shared by the worker pool
///
/// Workers take turns holding the receiver; each record is delivered
/// to exactly one worker.
#[derive(Debug)]
pub struct SharedReceiver<T> {
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
    signal: &'static str,
}

impl<T> Clone for SharedReceiver<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            signal: self.signal,
        }
    }
}

impl<T: Send> SharedReceiver<T> {
    /// Receive the next record, or `None` once the queue is closed and
    /// drained
    pub async fn recv(&self) -> Option<T> {
        let mut rx = self.rx.lock().await;
        let record = rx.recv().await;
        if record.is_some() {
            gauge!(names::QUEUE_SIZE, "signal" => self.signal).decrement(1.0);
        }
        record
    }

    /// Signal label for this queue
    pub fn signal(&self) -> &'static str {
        self.signal
    }
}
