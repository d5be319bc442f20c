//! OperationTracker (core spec §4.10): per-call operation lifecycle
//! tracking — a unique ID, a type classification, start time, and on
//! completion, duration and outcome — feeding success-rate and latency
//! counters the Repository exposes for observability.


use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{Span, debug, field, instrument};

/// The category of a tracked operation (core spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// A read of one or more entities.
    Read,
    /// A new entity being created.
    Write,
    /// An existing entity being replaced.
    Update,
    /// A logical deletion.
    Delete,
    /// Tag-index maintenance.
    Index,
    /// A WAL append or replay.
    Wal,
    /// A checkpoint transaction.
    Tx,
    /// An integrity verification pass.
    Verify,
    /// A recovery-path invocation.
    Recovery,
}

impl OperationType {
    fn as_str(self) -> &'static str {
        match self {
            OperationType::Read => "READ",
            OperationType::Write => "WRITE",
            OperationType::Update => "UPDATE",
            OperationType::Delete => "DELETE",
            OperationType::Index => "INDEX",
            OperationType::Wal => "WAL",
            OperationType::Tx => "TX",
            OperationType::Verify => "VERIFY",
            OperationType::Recovery => "RECOVERY",
        }
    }
}

/// Running counters for one [`OperationType`].
#[derive(Debug, Default, Clone, Copy)]
struct TypeCounters {
    successes: u64,
    failures: u64,
    total_latency: Duration,
}

/// A handle for one in-flight operation, opened by
/// [`OperationTracker::start`] and closed by [`Operation::finish`]. If
/// dropped without an explicit `finish` call, it is recorded as a failure
/// (an operation that never reports its outcome is assumed to have been
/// abandoned, e.g. by a panic unwinding through it).
pub struct Operation<'t> {
    tracker: &'t OperationTracker,
    id: u64,
    op_type: OperationType,
    started_at: Instant,
    span: Span,
    finished: bool,
}

impl Operation<'_> {
    /// This operation's unique ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Record that this operation completed successfully.
    pub fn succeed(mut self) {
        self.record(true, None);
        self.finished = true;
    }

    /// Record that this operation failed, with a short error-class label
    /// (e.g. `"CorruptionError"`) for the latency/outcome counters.
    pub fn fail(mut self, error_class: &str) {
        self.record(false, Some(error_class));
        self.finished = true;
    }

    fn record(&self, success: bool, error_class: Option<&str>) {
        let elapsed = self.started_at.elapsed();
        self.span.record("outcome", if success { "success" } else { "failure" });
        self.span.record("duration_us", elapsed.as_micros() as u64);
        self.tracker.record(self.op_type, success, elapsed);
        if !success {
            debug!(
                operation_id = self.id,
                op_type = self.op_type.as_str(),
                error_class = error_class.unwrap_or("unknown"),
                "operation failed"
            );
        }
    }
}

impl Drop for Operation<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.record(false, Some("abandoned"));
        }
    }
}

/// Snapshot of counters for a single [`OperationType`], returned by
/// [`OperationTracker::stats`].
#[derive(Debug, Clone, Copy)]
pub struct OperationStats {
    /// Successful completions.
    pub successes: u64,
    /// Failed completions (including abandoned operations).
    pub failures: u64,
    /// Mean latency across every recorded completion, or `None` if none
    /// have completed yet.
    pub mean_latency: Option<Duration>,
}

/// Tracks every in-flight and completed operation's lifecycle and exposes
/// aggregate counters.
pub struct OperationTracker {
    next_id: AtomicU64,
    active: AtomicU64,
    counters: Mutex<[TypeCounters; 9]>,
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationTracker {
    /// Build a tracker with all counters zeroed.
    pub fn new() -> Self {
        OperationTracker {
            next_id: AtomicU64::new(1),
            active: AtomicU64::new(0),
            counters: Mutex::new([TypeCounters::default(); 9]),
        }
    }

    /// Open a new operation of `op_type`, returning a handle the caller
    /// must close with [`Operation::succeed`] or [`Operation::fail`].
    #[instrument(skip(self), fields(operation_id = field::Empty, outcome = field::Empty, duration_us = field::Empty))]
    pub fn start(&self, op_type: OperationType) -> Operation<'_> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);
        Span::current().record("operation_id", id);
        Operation {
            tracker: self,
            id,
            op_type,
            started_at: Instant::now(),
            span: Span::current(),
            finished: false,
        }
    }

    fn record(&self, op_type: OperationType, success: bool, elapsed: Duration) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let slot = &mut counters[op_type as usize];
        if success {
            slot.successes += 1;
        } else {
            slot.failures += 1;
        }
        slot.total_latency += elapsed;
    }

    /// Number of operations currently open (started but not yet finished).
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Aggregate stats for `op_type`.
    pub fn stats(&self, op_type: OperationType) -> OperationStats {
        let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let slot = counters[op_type as usize];
        let total = slot.successes + slot.failures;
        OperationStats {
            successes: slot.successes,
            failures: slot.failures,
            mean_latency: (total > 0).then(|| slot.total_latency / total as u32),
        }
    }
}
