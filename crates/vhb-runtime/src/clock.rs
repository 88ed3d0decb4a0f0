#![forbid(unsafe_code)]

//! Host-driven monotonic clock.
//!
//! The host advances time explicitly (`updateTime`); nothing in the bridge
//! reads a wall clock. Clones share the same time source so player shims can
//! read the instant the context last pushed.

use core::time::Duration;
use std::cell::Cell;
use std::rc::Rc;

/// Deterministic monotonic clock controlled by the host.
#[derive(Debug, Default, Clone)]
pub struct DeterministicClock {
    now: Rc<Cell<Duration>>,
}

impl DeterministicClock {
    /// Create a clock starting at `0`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set current monotonic time.
    pub fn set(&self, now: Duration) {
        self.now.set(now);
    }

    /// Advance monotonic time by `dt`.
    pub fn advance(&self, dt: Duration) {
        self.now.set(self.now.get().saturating_add(dt));
    }

    /// Set time from host milliseconds. Non-finite, negative or
    /// out-of-range values are ignored.
    pub fn set_ms(&self, ms: f64) -> bool {
        match Duration::try_from_secs_f64(ms / 1000.0) {
            Ok(now) => {
                self.set(now);
                true
            }
            Err(_) => false,
        }
    }

    #[inline]
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    #[inline]
    pub fn now_ms(&self) -> f64 {
        self.now.get().as_secs_f64() * 1000.0
    }
}
