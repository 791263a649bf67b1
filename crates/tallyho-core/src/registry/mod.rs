//! Named registries of counters, metrics, labels and gauges.
//!
//! [`MetricsRegistry`] applies every call directly against concurrent maps.
//! [`AsyncRegistry`] wraps one and moves all mutations onto a single
//! background consumer, so call sites only ever pay for a queue insert.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use tallyho_core::registry::{MetricsRegistry, Registry};
//!
//! let registry = Arc::new(MetricsRegistry::new());
//! registry.incr("requests", 1).unwrap();
//! registry.add("latency_ms", 12).unwrap();
//! registry.set_label("build", "abc123").unwrap();
//! registry.register_gauge("queue_depth", Arc::new(|| 4.0));
//!
//! let snapshot = registry.snapshot();
//! assert_eq!(snapshot.counters()["requests"], 1);
//! assert_eq!(snapshot.gauges()["queue_depth"], 4.0);
//! ```

mod async_registry;
mod metrics_registry;

use std::collections::HashMap;
use std::sync::Arc;

pub use async_registry::{AsyncMetric, AsyncRegistry};
pub use metrics_registry::{new_shared_registry, MetricsRegistry, SharedRegistry};

use crate::error::Result;
use crate::metrics::{Counter, Distribution, Gauge, Metric, ReportingMode, Timer};
use crate::snapshot::Snapshot;

/// A counter value together with how it should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterReading {
    /// Current cumulative value.
    pub value: i64,
    /// Reporting mode of the counter.
    pub mode: ReportingMode,
}

/// Registry surface shared by the synchronous and the queued registry.
///
/// Get-or-create accessors are idempotent: the first instance created
/// under a name is the one every later caller sees.
pub trait Registry: Send + Sync {
    /// Record an observation into the named metric.
    fn add(&self, name: &str, value: i64) -> Result<()>;

    /// Merge a distribution into the named metric.
    fn add_distribution(&self, name: &str, distribution: Distribution) -> Result<()>;

    /// Increment the named counter by `n`.
    fn incr(&self, name: &str, n: i64) -> Result<()>;

    /// Increment the named counter by one.
    fn incr_one(&self, name: &str) -> Result<()> {
        self.incr(name, 1)
    }

    /// Set a label.
    fn set_label(&self, name: &str, value: &str) -> Result<()>;

    /// Remove a label.
    fn clear_label(&self, name: &str) -> Result<()>;

    /// Clear a metric's observations, keeping the metric registered.
    fn clear_metric(&self, name: &str) -> Result<()>;

    /// Reset a counter to zero, keeping it registered.
    fn clear_counter(&self, name: &str) -> Result<()>;

    /// Get or create a differential counter.
    fn counter(&self, name: &str) -> Arc<Counter> {
        self.counter_with_mode(name, ReportingMode::Differential)
    }

    /// Get or create a counter. The mode only applies if this call creates it.
    fn counter_with_mode(&self, name: &str, mode: ReportingMode) -> Arc<Counter>;

    /// Get or create a metric.
    fn metric(&self, name: &str) -> Arc<dyn Metric>;

    /// Get a label value.
    fn label(&self, name: &str) -> Option<String>;

    /// Register a gauge. An existing gauge under the same name is kept.
    fn register_gauge(&self, name: &str, gauge: Arc<dyn Gauge>);

    /// Remove a gauge.
    fn deregister_gauge(&self, name: &str);

    /// Counter values by name.
    fn counters(&self) -> HashMap<String, i64> {
        self.counter_readings()
            .into_iter()
            .map(|(name, reading)| (name, reading.value))
            .collect()
    }

    /// Counter values and reporting modes by name.
    fn counter_readings(&self) -> HashMap<String, CounterReading>;

    /// Metric distributions by name.
    fn metrics(&self) -> HashMap<String, Distribution>;

    /// Label values by name.
    fn labels(&self) -> HashMap<String, String>;

    /// Fresh gauge readings by name.
    fn gauges(&self) -> HashMap<String, f64>;

    /// Drop all counters, metrics and labels and restart the window.
    /// Gauges stay registered.
    fn clear_all(&self);

    /// Cumulative snapshot since creation or the last `clear_all`.
    fn snapshot(&self) -> Snapshot;
}

/// Create a stopped timer bound to a shared registry.
pub fn timer<R>(registry: &Arc<R>, name: &str) -> Timer
where
    R: Registry + 'static,
{
    let registry: Arc<dyn Registry> = registry.clone();
    Timer::new(registry, name)
}
