//! # Fibonacci Backoff
//!
//! Progressive requeue delays for failed reconcile passes. The sequence grows
//! more slowly than exponential backoff: min, min, 2·min, 3·min, 5·min, ... capped at max.
//!
//! [`BackoffRegistry`] keeps one sequence per object key so a failing source does
//! not slow down the others, and resets it after a successful pass.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Fibonacci backoff calculator
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min: Duration,
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff between `min` and `max`.
    ///
    /// `min` is used for the first two values.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = next.min(self.max);
        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}

/// Per-object backoff sequences, keyed by `kind/namespace/name`.
#[derive(Debug)]
pub struct BackoffRegistry {
    min: Duration,
    max: Duration,
    states: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl BackoffRegistry {
    /// Create an empty registry whose sequences run from `min` to `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Next delay for `key`, advancing its sequence
    pub fn next_for(&self, key: &str) -> Duration {
        let Ok(mut states) = self.states.lock() else {
            return self.max;
        };
        states
            .entry(key.to_string())
            .or_insert_with(|| FibonacciBackoff::new(self.min, self.max))
            .next_backoff()
    }

    /// Forget the sequence of `key` after a successful pass
    pub fn reset(&self, key: &str) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(key);
        }
    }
}
