//! Atomic counters.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::Serialize;

/// How the collector reports a counter at each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportingMode {
    /// Report the change since the previous tick.
    #[default]
    Differential,
    /// Report the cumulative value every tick.
    Integral,
}

/// Lock-free 64-bit counter.
///
/// Increments wrap on overflow; the collector's delta math accounts for
/// wraparound rather than clamping here.
#[derive(Default)]
pub struct Counter {
    value: AtomicI64,
    mode: ReportingMode,
}

impl Counter {
    /// Create a differential counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a counter with the given reporting mode.
    pub fn with_mode(mode: ReportingMode) -> Self {
        Self {
            value: AtomicI64::new(0),
            mode,
        }
    }

    /// Increment by one and return the new value.
    pub fn incr(&self) -> i64 {
        self.incr_by(1)
    }

    /// Increment by `n` and return the new value.
    pub fn incr_by(&self, n: i64) -> i64 {
        self.value.fetch_add(n, Ordering::Relaxed).wrapping_add(n)
    }

    /// Get the current value.
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Overwrite the value.
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Reset to zero.
    pub fn reset(&self) {
        self.set(0);
    }

    /// Get the reporting mode.
    pub fn mode(&self) -> ReportingMode {
        self.mode
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter")
            .field("value", &self.value())
            .field("mode", &self.mode)
            .finish()
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Counter[{}]", self.value())
    }
}
