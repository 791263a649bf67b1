//! Periodic snapshot/delta collection.
//!
//! A [`Collector`] reads a registry once per tick, turns cumulative counter
//! and metric values into per-tick deltas, and hands the resulting
//! [`Snapshot`] to every registered [`Reporter`]. A [`CollectionScheduler`]
//! drives ticks on a tokio runtime.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use tallyho_core::collector::{Collector, LogReporter};
//! use tallyho_core::registry::{MetricsRegistry, Registry};
//!
//! let registry = Arc::new(MetricsRegistry::new());
//! let collector = Collector::new(registry.clone());
//! collector.add_reporter(Arc::new(LogReporter::new()));
//!
//! registry.incr("requests", 5).unwrap();
//! let tick = collector.collect();
//! assert_eq!(tick.counters()["requests"], 5);
//!
//! let tick = collector.collect();
//! assert_eq!(tick.counters()["requests"], 0);
//! ```

mod delta;
mod reporter;
mod scheduler;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

pub use delta::counter_delta;
pub use reporter::{FilterMode, FilteringReporter, LogReporter, ReportError, Reporter};
pub use scheduler::{CollectionScheduler, ScheduleId};

use crate::config::CollectorConfig;
use crate::registry::Registry;
use crate::snapshot::Snapshot;
use delta::Baseline;

/// Handle for a registered reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReporterId(u64);

impl fmt::Display for ReporterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reporter-{}", self.0)
    }
}

struct TickState {
    baseline: Baseline,
    last_tick: DateTime<Utc>,
}

/// Snapshot/delta engine over a registry.
pub struct Collector {
    registry: Arc<dyn Registry>,
    /// Held for the whole tick, so collections never overlap.
    tick: Mutex<TickState>,
    latest: RwLock<Arc<Snapshot>>,
    reporters: RwLock<Vec<(ReporterId, Arc<dyn Reporter>)>>,
    next_reporter_id: AtomicU64,
}

impl Collector {
    /// Create a collector with the default configuration.
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self::with_config(registry, CollectorConfig::default())
    }

    /// Create a collector with an explicit configuration.
    pub fn with_config(registry: Arc<dyn Registry>, config: CollectorConfig) -> Self {
        let now = Utc::now();
        let baseline = if config.start_clean {
            Baseline::seeded(&registry.counter_readings(), registry.metrics())
        } else {
            Baseline::default()
        };

        Self {
            registry,
            tick: Mutex::new(TickState {
                baseline,
                last_tick: now,
            }),
            latest: RwLock::new(Arc::new(Snapshot::empty(now))),
            reporters: RwLock::new(Vec::new()),
            next_reporter_id: AtomicU64::new(1),
        }
    }

    /// The registry being collected.
    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    /// Register a reporter. Reporters are notified in registration order.
    pub fn add_reporter(&self, reporter: Arc<dyn Reporter>) -> ReporterId {
        let id = ReporterId(self.next_reporter_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(reporter = reporter.name(), id = %id, "reporter added");
        self.reporters.write().push((id, reporter));
        id
    }

    /// Remove a reporter. Returns whether it was registered.
    pub fn remove_reporter(&self, id: ReporterId) -> bool {
        let mut reporters = self.reporters.write();
        let before = reporters.len();
        reporters.retain(|(rid, _)| *rid != id);
        reporters.len() != before
    }

    /// Number of registered reporters.
    pub fn reporter_count(&self) -> usize {
        self.reporters.read().len()
    }

    /// Run one tick: compute deltas since the previous tick and notify
    /// every reporter.
    ///
    /// Concurrent callers are serialized. Reporters must not call
    /// `collect` on the same collector.
    pub fn collect(&self) -> Arc<Snapshot> {
        let started = Instant::now();
        let mut tick = self.tick.lock();

        let readings = self.registry.counter_readings();
        let metrics = self.registry.metrics();
        let gauges = self.registry.gauges();
        let labels = self.registry.labels();

        let counters = tick.baseline.advance_counters(readings);
        let metrics = tick.baseline.advance_metrics(metrics);

        let now = Utc::now();
        let start = std::mem::replace(&mut tick.last_tick, now);
        let snapshot = Arc::new(Snapshot::new(counters, metrics, labels, gauges, start, now));
        *self.latest.write() = Arc::clone(&snapshot);

        let delivered = self.notify(&snapshot);
        drop(tick);

        tracing::debug!(
            counters = snapshot.counters().len(),
            metrics = snapshot.metrics().len(),
            reporters = delivered,
            duration_us = started.elapsed().as_micros() as u64,
            "collection complete"
        );
        snapshot
    }

    /// The delta snapshot produced by the latest tick, without collecting.
    pub fn delta_summary(&self) -> Arc<Snapshot> {
        Arc::clone(&self.latest.read())
    }

    /// Cumulative snapshot read directly from the registry.
    pub fn full_summary(&self) -> Snapshot {
        self.registry.snapshot()
    }

    /// Deliver a snapshot to every reporter, isolating failures.
    /// Returns the number of successful deliveries.
    fn notify(&self, snapshot: &Snapshot) -> usize {
        let reporters = self.reporters.read().clone();
        let mut delivered = 0;

        for (id, reporter) in &reporters {
            match panic::catch_unwind(AssertUnwindSafe(|| reporter.report(snapshot))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(reporter = reporter.name(), id = %id, error = %e, "reporter failed");
                }
                Err(_) => {
                    tracing::error!(reporter = reporter.name(), id = %id, "reporter panicked");
                }
            }
        }
        delivered
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("reporters", &self.reporter_count())
            .finish()
    }
}
