//! A reader-writer lock with a bounded writer-preference policy.
//!
//! `std::sync::RwLock` (and most OS-backed RW locks) make no fairness
//! guarantee: under a steady stream of readers, a waiting writer can be
//! starved indefinitely. Core spec §5 requires the opposite failure mode
//! be impossible too — a burst of writes must not starve readers either —
//! so the policy implemented here is a middle ground: readers are
//! admitted freely *unless* a writer has been waiting longer than
//! [`FairRwLock::DEFAULT_WRITER_PREFERENCE_THRESHOLD`], at which point new
//! readers block until that writer (and any writer that arrived ahead of
//! it) has run.
//!
//! Readers already holding the lock when a writer starts waiting are never
//! preempted — only *new* read acquisitions are held back once the
//! threshold elapses.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

struct LockState {
    readers: usize,
    writer_active: bool,
    waiting_writers: usize,
    oldest_writer_wait_start: Option<Instant>,
}

/// A fair, writer-preference-after-threshold reader-writer lock.
pub struct FairRwLock<T> {
    state: Mutex<LockState>,
    not_busy: Condvar,
    threshold: Duration,
    data: std::cell::UnsafeCell<T>,
}

// SAFETY: access to `data` is only ever granted through `read`/`write`,
// both of which hold `state` locked while checking/adjusting reader and
// writer counts, and the returned guards hand out `&T`/`&mut T` under the
// same aliasing rules a real `RwLock` enforces.
unsafe impl<T: Send> Send for FairRwLock<T> {}
unsafe impl<T: Send> Sync for FairRwLock<T> {}

impl<T> FairRwLock<T> {
    /// Default writer-preference threshold named in core spec §5 (10ms).
    pub const DEFAULT_WRITER_PREFERENCE_THRESHOLD: Duration = Duration::from_millis(10);

    /// Build a lock with the default writer-preference threshold.
    pub fn new(value: T) -> Self {
        Self::with_threshold(value, Self::DEFAULT_WRITER_PREFERENCE_THRESHOLD)
    }

    /// Build a lock with an explicit writer-preference threshold.
    pub fn with_threshold(value: T, threshold: Duration) -> Self {
        FairRwLock {
            state: Mutex::new(LockState {
                readers: 0,
                writer_active: false,
                waiting_writers: 0,
                oldest_writer_wait_start: None,
            }),
            not_busy: Condvar::new(),
            threshold,
            data: std::cell::UnsafeCell::new(value),
        }
    }

    fn writer_preference_engaged(state: &LockState, threshold: Duration) -> bool {
        state.waiting_writers > 0
            && state
                .oldest_writer_wait_start
                .is_some_and(|start| start.elapsed() >= threshold)
    }

    /// Acquire a shared read guard, blocking only if a writer is active or
    /// writer preference has engaged.
    pub fn read(&self) -> FairReadGuard<'_, T> {
        let mut state = self.state.lock();
        loop {
            if !state.writer_active && !Self::writer_preference_engaged(&state, self.threshold) {
                state.readers += 1;
                break;
            }
            self.not_busy.wait_for(&mut state, Duration::from_millis(1));
        }
        drop(state);
        FairReadGuard { lock: self }
    }

    /// Acquire an exclusive write guard.
    pub fn write(&self) -> FairWriteGuard<'_, T> {
        let mut state = self.state.lock();
        state.waiting_writers += 1;
        if state.waiting_writers == 1 {
            state.oldest_writer_wait_start = Some(Instant::now());
        }
        while state.writer_active || state.readers > 0 {
            self.not_busy.wait_for(&mut state, Duration::from_millis(1));
        }
        state.waiting_writers -= 1;
        if state.waiting_writers == 0 {
            state.oldest_writer_wait_start = None;
        }
        state.writer_active = true;
        drop(state);
        FairWriteGuard { lock: self }
    }

    fn release_read(&self) {
        let mut state = self.state.lock();
        state.readers -= 1;
        if state.readers == 0 {
            drop(state);
            self.not_busy.notify_all();
        }
    }

    fn release_write(&self) {
        let mut state = self.state.lock();
        state.writer_active = false;
        drop(state);
        self.not_busy.notify_all();
    }
}

/// RAII shared-read guard for [`FairRwLock`].
pub struct FairReadGuard<'a, T> {
    lock: &'a FairRwLock<T>,
}

impl<T> std::ops::Deref for FairReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding a read guard guarantees no writer is active.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for FairReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// RAII exclusive-write guard for [`FairRwLock`].
pub struct FairWriteGuard<'a, T> {
    lock: &'a FairRwLock<T>,
}

impl<T> std::ops::Deref for FairWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding a write guard guarantees exclusive access.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> std::ops::DerefMut for FairWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding a write guard guarantees exclusive access.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for FairWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}
