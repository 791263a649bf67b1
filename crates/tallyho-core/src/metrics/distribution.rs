//! Immutable summaries of recorded observations.

use std::collections::BTreeMap;

use serde::ser::{Serialize, Serializer};

use super::histogram::Histogram;
use crate::error::{Error, Result};

/// Percentiles included in [`Distribution::summary_map`].
pub const SUMMARY_PERCENTILES: [(&str, f64); 8] = [
    ("p25", 0.25),
    ("p50", 0.5),
    ("p75", 0.75),
    ("p90", 0.9),
    ("p95", 0.95),
    ("p99", 0.99),
    ("p999", 0.999),
    ("p9999", 0.9999),
];

/// A point-in-time summary of a metric.
///
/// The variant set is closed: deltas and merges are only defined between
/// distributions of the same kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    /// Bucketed distribution backed by a histogram copy.
    Histogram(HistogramDistribution),
    /// Externally computed count/sum/min/max summary without buckets.
    Summary(SummaryDistribution),
}

impl Distribution {
    /// Name of the concrete kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Distribution::Histogram(_) => "histogram",
            Distribution::Summary(_) => "summary",
        }
    }

    /// An empty histogram distribution.
    pub fn empty() -> Self {
        Distribution::Histogram(HistogramDistribution::new(Histogram::new()))
    }

    /// Get the number of observations.
    pub fn count(&self) -> i64 {
        match self {
            Distribution::Histogram(d) => d.histogram.count(),
            Distribution::Summary(s) => s.count,
        }
    }

    /// Get the sum of all observations.
    pub fn sum(&self) -> i64 {
        match self {
            Distribution::Histogram(d) => d.histogram.sum(),
            Distribution::Summary(s) => s.sum,
        }
    }

    /// Get the (approximate) minimum.
    pub fn minimum(&self) -> u64 {
        match self {
            Distribution::Histogram(d) => d.histogram.minimum(),
            Distribution::Summary(s) => s.minimum,
        }
    }

    /// Get the (approximate) maximum.
    pub fn maximum(&self) -> u64 {
        match self {
            Distribution::Histogram(d) => d.histogram.maximum(),
            Distribution::Summary(s) => s.maximum,
        }
    }

    /// Get the mean, or `0.0` when there are no observations.
    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count > 0 {
            self.sum() as f64 / count as f64
        } else {
            0.0
        }
    }

    /// Get an approximate percentile.
    ///
    /// Summaries carry no shape information: `0.0` yields the minimum, `1.0`
    /// and above the maximum, anything in between the rounded mean.
    pub fn percentile(&self, p: f64) -> u64 {
        match self {
            Distribution::Histogram(d) => d.histogram.percentile(p),
            Distribution::Summary(s) => {
                if p <= 0.0 {
                    s.minimum
                } else if p >= 1.0 {
                    s.maximum
                } else {
                    self.mean().round() as u64
                }
            }
        }
    }

    /// Subtract an earlier distribution from this one.
    ///
    /// Fails with [`Error::IncompatibleDistribution`] when the kinds differ.
    pub fn delta(&self, other: &Distribution) -> Result<Distribution> {
        match (self, other) {
            (Distribution::Histogram(a), Distribution::Histogram(b)) => Ok(
                Distribution::Histogram(HistogramDistribution::new(a.histogram.minus(&b.histogram))),
            ),
            (Distribution::Summary(a), Distribution::Summary(b)) => {
                Ok(Distribution::Summary(SummaryDistribution {
                    count: a.count - b.count,
                    sum: a.sum.wrapping_sub(b.sum),
                    minimum: a.minimum,
                    maximum: a.maximum,
                }))
            }
            _ => Err(Error::IncompatibleDistribution {
                expected: self.kind(),
                found: other.kind(),
            }),
        }
    }

    /// Flatten into named statistics.
    ///
    /// Percentile entries are only present when there are observations.
    pub fn summary_map(&self) -> BTreeMap<&'static str, f64> {
        let mut map = BTreeMap::new();
        map.insert("count", self.count() as f64);
        map.insert("sum", self.sum() as f64);
        map.insert("minimum", self.minimum() as f64);
        map.insert("maximum", self.maximum() as f64);
        map.insert("mean", self.mean());
        if self.count() > 0 {
            for (label, p) in SUMMARY_PERCENTILES {
                map.insert(label, self.percentile(p) as f64);
            }
        }
        map
    }
}

impl From<Histogram> for Distribution {
    fn from(histogram: Histogram) -> Self {
        Distribution::Histogram(HistogramDistribution::new(histogram))
    }
}

impl From<SummaryDistribution> for Distribution {
    fn from(summary: SummaryDistribution) -> Self {
        Distribution::Summary(summary)
    }
}

impl Serialize for Distribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.summary_map())
    }
}

/// Distribution backed by an owned histogram copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramDistribution {
    histogram: Histogram,
}

impl HistogramDistribution {
    /// Wrap a histogram. The caller hands over its own copy.
    pub fn new(histogram: Histogram) -> Self {
        Self { histogram }
    }

    /// Borrow the underlying histogram.
    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }
}

/// Count/sum/min/max summary computed outside the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SummaryDistribution {
    /// Number of observations.
    pub count: i64,
    /// Sum of observations.
    pub sum: i64,
    /// Smallest observation.
    pub minimum: u64,
    /// Largest observation.
    pub maximum: u64,
}

impl SummaryDistribution {
    /// Create a summary.
    pub fn new(count: i64, sum: i64, minimum: u64, maximum: u64) -> Self {
        Self {
            count,
            sum,
            minimum,
            maximum,
        }
    }

    /// Fold one observation in.
    pub fn record(&mut self, value: u64) {
        self.merge(&SummaryDistribution::new(1, value as i64, value, value));
    }

    /// Fold another summary in. Empty summaries leave min/max untouched.
    pub fn merge(&mut self, other: &SummaryDistribution) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            self.minimum = other.minimum;
            self.maximum = other.maximum;
        } else {
            self.minimum = self.minimum.min(other.minimum);
            self.maximum = self.maximum.max(other.maximum);
        }
        self.count += other.count;
        self.sum = self.sum.wrapping_add(other.sum);
    }
}
