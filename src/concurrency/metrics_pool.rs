//! Bounded worker pool for metric-write backpressure (core spec §5:
//! "Metric-write paths that write to the core must submit through a
//! bounded worker pool... Queue overflow results in dropped metrics
//! rather than goroutine/thread blowup").
//!
//! Grounded on the donor's `crossbeam` dependency, which is declared in
//! its `Cargo.toml` but never consumed anywhere in its `src/` — this is
//! the first real use of it in this crate.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use tracing::warn;

/// A unit of metrics work: a closure run on a worker thread.
type Job = Box<dyn FnOnce() + Send + 'static>;

/// Error returned when the bounded queue is full.
#[derive(Debug, thiserror::Error)]
#[error("metrics queue full")]
pub struct QueueFullError;

/// A fixed-size pool of worker threads draining a bounded job queue.
/// Submissions past the queue's capacity are rejected (not blocked on),
/// matching the "drop rather than block" backpressure policy.
pub struct MetricsPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl MetricsPool {
    /// Start `worker_count` threads draining a queue of capacity
    /// `queue_capacity`.
    pub fn new(worker_count: usize, queue_capacity: usize) -> Self {
        let worker_count = worker_count.max(1);
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = channel::bounded(queue_capacity.max(1));

        let workers = (0..worker_count)
            .map(|id| {
                let receiver = receiver.clone();
                std::thread::Builder::new()
                    .name(format!("entitydb-metrics-{id}"))
                    .spawn(move || {
                        for job in receiver.iter() {
                            job();
                        }
                    })
                    .expect("spawning a metrics worker thread")
            })
            .collect();

        MetricsPool {
            sender: Some(sender),
            workers,
        }
    }

    /// Submit a job. Returns [`QueueFullError`] immediately if the queue
    /// is at capacity — this call never blocks the caller.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), QueueFullError> {
        let Some(sender) = self.sender.as_ref() else {
            return Err(QueueFullError);
        };
        match sender.try_send(Box::new(job)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("metrics queue full, dropping submission");
                Err(QueueFullError)
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("metrics pool shut down, dropping submission");
                Err(QueueFullError)
            }
        }
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for MetricsPool {
    fn drop(&mut self) {
        // Drop the sender first so the channel closes and workers'
        // `receiver.iter()` loops terminate, then join them so a
        // `MetricsPool` never outlives its threads.
        self.sender.take();
        for worker in std::mem::take(&mut self.workers) {
            let _ = worker.join();
        }
    }
}

/// Shared handle to a [`MetricsPool`], cloneable across Repository
/// callers.
pub type SharedMetricsPool = Arc<MetricsPool>;
