//! Tallyho Core - In-process metrics registry, histograms, and collection.
//!
//! Application code records counters, histogram observations, labels and
//! gauges into a shared registry. A collector turns the registry's
//! cumulative state into per-tick deltas and hands them to reporters.

pub mod collector;
pub mod config;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod snapshot;

pub use config::{
    AsyncRegistryConfig, CollectorConfig, NegativeValuePolicy, OverflowPolicy, RegistryConfig,
};
pub use error::{Error, Result};
pub use snapshot::{NamePattern, Snapshot};

// Metrics exports
pub use metrics::{
    Counter, Distribution, Gauge, Histogram, HistogramMetric, Metric, ReportingMode,
    SummaryDistribution, SummaryMetric, Timer,
};

// Registry exports
pub use registry::{
    new_shared_registry, timer, AsyncMetric, AsyncRegistry, CounterReading, MetricsRegistry,
    Registry, SharedRegistry,
};

// Collector exports
pub use collector::{
    CollectionScheduler, Collector, FilterMode, FilteringReporter, LogReporter, ReportError,
    Reporter, ReporterId, ScheduleId,
};
