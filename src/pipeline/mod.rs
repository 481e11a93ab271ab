//! Asynchronous batching pipeline: bounded queues and worker pools

mod queue;
mod worker;

pub use queue::{signal_queue, SharedReceiver, SignalQueue, ENQUEUE_TIMEOUT};
pub use worker::{spawn_workers, BatchSink, RetryPolicy, WorkerConfig};
