//! Metric capability and the histogram-backed implementation.

use parking_lot::Mutex;

use super::distribution::{Distribution, SummaryDistribution};
use super::histogram::Histogram;
use crate::config::NegativeValuePolicy;
use crate::error::{Error, Result};

/// A named series of observations.
///
/// Implemented by [`HistogramMetric`] and [`SummaryMetric`] for direct
/// recording and by [`AsyncMetric`](crate::registry::AsyncMetric) for
/// queue-forwarded recording.
pub trait Metric: Send + Sync {
    /// Record one observation.
    fn add(&self, value: i64) -> Result<()>;

    /// Fold a pre-aggregated distribution into this metric.
    fn merge(&self, distribution: &Distribution) -> Result<()>;

    /// Drop all recorded observations.
    fn clear(&self);

    /// Take an immutable copy of the current state.
    fn snapshot(&self) -> Distribution;
}

/// Metric backed by a [`Histogram`].
///
/// Every read-modify-write goes through one mutex, since the histogram has
/// no synchronization of its own.
#[derive(Debug, Default)]
pub struct HistogramMetric {
    histogram: Mutex<Histogram>,
    policy: NegativeValuePolicy,
}

impl HistogramMetric {
    /// Create an empty metric that ignores negative values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty metric with an explicit negative value policy.
    pub fn with_policy(policy: NegativeValuePolicy) -> Self {
        Self {
            histogram: Mutex::new(Histogram::new()),
            policy,
        }
    }

    /// Get the current observation count.
    pub fn count(&self) -> i64 {
        self.histogram.lock().count()
    }
}

/// Apply a negative value policy. `None` means the value is dropped.
fn accept(policy: NegativeValuePolicy, value: i64) -> Result<Option<u64>> {
    match u64::try_from(value) {
        Ok(value) => Ok(Some(value)),
        Err(_) => match policy {
            NegativeValuePolicy::Ignore => {
                tracing::trace!(value, "ignoring negative observation");
                Ok(None)
            }
            NegativeValuePolicy::Reject => Err(Error::NegativeObservation { value }),
        },
    }
}

impl Metric for HistogramMetric {
    fn add(&self, value: i64) -> Result<()> {
        if let Some(value) = accept(self.policy, value)? {
            self.histogram.lock().add(value);
        }
        Ok(())
    }

    fn merge(&self, distribution: &Distribution) -> Result<()> {
        match distribution {
            Distribution::Histogram(dist) => {
                self.histogram.lock().merge(dist.histogram());
                Ok(())
            }
            other => Err(Error::IncompatibleDistribution {
                expected: "histogram",
                found: other.kind(),
            }),
        }
    }

    fn clear(&self) {
        self.histogram.lock().clear();
    }

    fn snapshot(&self) -> Distribution {
        Distribution::from(self.histogram.lock().clone())
    }
}

/// Metric that keeps only count, sum, minimum and maximum.
///
/// Created by the registry when the first distribution pushed under a name
/// is a summary. Observations are folded in exactly.
#[derive(Debug, Default)]
pub struct SummaryMetric {
    summary: Mutex<SummaryDistribution>,
    policy: NegativeValuePolicy,
}

impl SummaryMetric {
    /// Create an empty summary metric.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty summary metric with an explicit negative value policy.
    pub fn with_policy(policy: NegativeValuePolicy) -> Self {
        Self {
            summary: Mutex::new(SummaryDistribution::default()),
            policy,
        }
    }
}

impl Metric for SummaryMetric {
    fn add(&self, value: i64) -> Result<()> {
        if let Some(value) = accept(self.policy, value)? {
            self.summary.lock().record(value);
        }
        Ok(())
    }

    fn merge(&self, distribution: &Distribution) -> Result<()> {
        match distribution {
            Distribution::Summary(summary) => {
                self.summary.lock().merge(summary);
                Ok(())
            }
            other => Err(Error::IncompatibleDistribution {
                expected: "summary",
                found: other.kind(),
            }),
        }
    }

    fn clear(&self) {
        *self.summary.lock() = SummaryDistribution::default();
    }

    fn snapshot(&self) -> Distribution {
        Distribution::Summary(*self.summary.lock())
    }
}
