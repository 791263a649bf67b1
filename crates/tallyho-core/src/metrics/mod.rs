//! Instrumentation primitives.
//!
//! This module provides the building blocks recorded into a registry:
//! atomic counters, histogram-backed metrics, on-demand gauges, and the
//! timer helper.
//!
//! # Usage
//!
//! ```
//! use tallyho_core::metrics::{Histogram, HistogramMetric, Metric};
//!
//! let metric = HistogramMetric::new();
//! metric.add(1500).unwrap();
//! metric.add(-3).unwrap(); // ignored under the default policy
//!
//! let dist = metric.snapshot();
//! assert_eq!(dist.count(), 1);
//!
//! let mut hist = Histogram::new();
//! hist.add(42);
//! assert_eq!(hist.percentile(0.5), 42);
//! ```

mod counter;
mod distribution;
mod gauge;
mod histogram;
mod metric;
mod timer;

pub use counter::{Counter, ReportingMode};
pub use distribution::{
    Distribution, HistogramDistribution, SummaryDistribution, SUMMARY_PERCENTILES,
};
pub use gauge::Gauge;
pub use histogram::{Histogram, BUCKET_OFFSETS, NUM_BUCKETS, OVERFLOW_SENTINEL};
pub use metric::{HistogramMetric, Metric, SummaryMetric};
pub use timer::{Timer, TimerRecord, TIMER_SUFFIX};
