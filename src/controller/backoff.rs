//! # Fibonacci Backoff
//!
//! Progressive retry intervals for reconcile errors.
//!
//! The sequence follows the Fibonacci numbers scaled to seconds
//! (1s, 1s, 2s, 3s, 5s, 8s, ...) and is capped at the configured maximum.
//! Each resource keeps its own backoff so one failing resource never slows
//! down the others.

/// Fibonacci backoff state for one resource
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    max_secs: u64,
    previous: u64,
    current: u64,
}

impl FibonacciBackoff {
    /// Create a backoff starting at `min_secs` and capped at `max_secs`
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        let min_secs = min_secs.max(1);
        Self {
            max_secs: max_secs.max(min_secs),
            previous: 0,
            current: min_secs,
        }
    }

    /// Return the next backoff interval in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let backoff = self.current.min(self.max_secs);
        if self.current < self.max_secs {
            let next = self.previous.saturating_add(self.current);
            self.previous = self.current;
            self.current = next;
        }
        backoff
    }
}
