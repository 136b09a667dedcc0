//! Per-batch shared state
//!
//! One [`BatchState`] exists per `execute_all` call. Workers race on the index counter and
//! counters; each successful result lands in the slot of its input index, so output order
//! never depends on completion order.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Shared mutable state of one running batch
#[derive(Debug)]
pub struct BatchState<T> {
    total: usize,
    next_index: AtomicUsize,
    slots: Mutex<Vec<Option<T>>>,
    completed: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicBool,
}

impl<T> BatchState<T> {
    /// Empty state for `total` operations
    pub fn new(total: usize) -> Self {
        let mut slots = Vec::with_capacity(total);
        slots.resize_with(total, || None);

        Self {
            total,
            next_index: AtomicUsize::new(0),
            slots: Mutex::new(slots),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Claim the next unclaimed index, or `None` once exhausted or cancelled
    pub fn claim(&self) -> Option<usize> {
        if self.is_cancelled() {
            return None;
        }
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        (index < self.total).then_some(index)
    }

    /// Store the result of the operation at `index`
    pub fn record_success(&self, index: usize, value: T) {
        if let Some(slot) = self.slots.lock().get_mut(index) {
            *slot = Some(value);
        }
    }

    /// Count an exhausted operation, returning the new failure count
    pub fn record_failure(&self) -> usize {
        self.failed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Count a finished operation, returning the new completed count
    pub fn mark_completed(&self) -> usize {
        self.completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Set the cancellation latch. Returns `true` for the caller that set it first.
    pub fn latch_cancelled(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    /// Whether the latch is set
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Batch size
    pub fn total(&self) -> usize {
        self.total
    }

    /// Finished operations, successes and failures alike
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Exhausted operations
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Drain the successful results in input order, skipping failed slots
    pub fn take_successes(&self) -> Vec<T> {
        std::mem::take(&mut *self.slots.lock())
            .into_iter()
            .flatten()
            .collect()
    }
}
