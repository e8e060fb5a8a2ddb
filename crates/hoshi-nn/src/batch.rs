//! Batch readiness for the evaluator's server threads.

use std::time::{Duration, Instant};

/// Tracks the batch a server thread is filling.
///
/// The wait clock opens when the first job lands in an empty batch. The
/// batch is ready once it holds `capacity` jobs or that first job has waited
/// `max_wait`.
pub struct BatchCollector {
    capacity: usize,
    max_wait: Duration,

    /// Arrival of the oldest job in the open batch
    opened_at: Option<Instant>,
}

impl BatchCollector {
    pub fn new(capacity: usize, max_wait_ms: u64) -> Self {
        Self {
            capacity,
            max_wait: Duration::from_millis(max_wait_ms),
            opened_at: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Room left in a batch currently holding `pending` jobs.
    pub fn room(&self, pending: usize) -> usize {
        self.capacity.saturating_sub(pending)
    }

    /// Records that the batch now holds `pending` jobs, opening the clock
    /// on the first one.
    pub fn observe(&mut self, pending: usize) {
        if pending > 0 && self.opened_at.is_none() {
            self.opened_at = Some(Instant::now());
        }
    }

    pub fn is_open(&self) -> bool {
        self.opened_at.is_some()
    }

    /// True once the batch is full or its oldest job has waited `max_wait`.
    pub fn is_ready(&self, pending: usize) -> bool {
        if pending == 0 {
            return false;
        }
        if pending >= self.capacity {
            return true;
        }
        self.opened_at
            .is_some_and(|opened| opened.elapsed() >= self.max_wait)
    }

    /// How long to block for the next job: the open batch's deadline, capped
    /// at `idle`.
    pub fn next_wait(&self, idle: Duration) -> Duration {
        match self.opened_at {
            Some(opened) => self.max_wait.saturating_sub(opened.elapsed()).min(idle),
            None => idle,
        }
    }

    /// Closes the batch after it has run.
    pub fn close(&mut self) {
        self.opened_at = None;
    }
}
