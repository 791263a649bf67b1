//! Per-tick delta computation against the previous tick's values.

use std::collections::HashMap;

use crate::metrics::{Distribution, ReportingMode};
use crate::registry::CounterReading;

/// Change of a counter between two readings.
///
/// Counters wrap from `i64::MAX` to `i64::MIN`, so a reading lower than the
/// previous one is a wrap: `(MAX - last) + (current - MIN) + 1`, which in
/// two's complement is the wrapping difference.
pub fn counter_delta(last: i64, current: i64) -> i64 {
    current.wrapping_sub(last)
}

/// Values observed at the previous tick.
#[derive(Debug, Clone, Default)]
pub(crate) struct Baseline {
    counters: HashMap<String, i64>,
    metrics: HashMap<String, Distribution>,
}

impl Baseline {
    /// Seed a baseline from current readings.
    pub(crate) fn seeded(
        readings: &HashMap<String, CounterReading>,
        metrics: HashMap<String, Distribution>,
    ) -> Self {
        Self {
            counters: readings
                .iter()
                .map(|(name, reading)| (name.clone(), reading.value))
                .collect(),
            metrics,
        }
    }

    /// Compute per-counter deltas and replace the counter baseline.
    ///
    /// Names not seen at the previous tick start from zero.
    pub(crate) fn advance_counters(
        &mut self,
        readings: HashMap<String, CounterReading>,
    ) -> HashMap<String, i64> {
        let mut deltas = HashMap::with_capacity(readings.len());
        let mut next = HashMap::with_capacity(readings.len());

        for (name, reading) in readings {
            let reported = match reading.mode {
                ReportingMode::Differential => {
                    let last = self.counters.get(&name).copied().unwrap_or(0);
                    counter_delta(last, reading.value)
                }
                ReportingMode::Integral => reading.value,
            };
            deltas.insert(name.clone(), reported);
            next.insert(name, reading.value);
        }

        self.counters = next;
        deltas
    }

    /// Compute per-metric deltas and replace the metric baseline.
    ///
    /// A metric whose kind changed since the previous tick is reported in
    /// full and becomes the new baseline.
    pub(crate) fn advance_metrics(
        &mut self,
        current: HashMap<String, Distribution>,
    ) -> HashMap<String, Distribution> {
        let mut deltas = HashMap::with_capacity(current.len());

        for (name, dist) in &current {
            let delta = match self.metrics.get(name) {
                Some(last) => dist.delta(last).unwrap_or_else(|e| {
                    tracing::warn!(metric = %name, error = %e, "resetting metric baseline");
                    dist.clone()
                }),
                None => dist.clone(),
            };
            deltas.insert(name.clone(), delta);
        }

        self.metrics = current;
        deltas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Histogram, SummaryDistribution};
    use pretty_assertions::assert_eq;

    fn reading(value: i64) -> CounterReading {
        CounterReading {
            value,
            mode: ReportingMode::Differential,
        }
    }

    #[test]
    fn test_counter_delta() {
        assert_eq!(counter_delta(10, 15), 5);
        assert_eq!(counter_delta(7, 7), 0);
        assert_eq!(counter_delta(0, 42), 42);
    }

    #[test]
    fn test_counter_delta_wraparound() {
        assert_eq!(counter_delta(i64::MAX - 2, i64::MIN + 3), 6);
        assert_eq!(counter_delta(i64::MAX, i64::MIN), 1);
        assert_eq!(counter_delta(-5, 5), 10);
    }

    #[test]
    fn test_advance_counters() {
        let mut baseline = Baseline::default();

        let first = baseline.advance_counters(HashMap::from([("req".to_string(), reading(3))]));
        assert_eq!(first, HashMap::from([("req".to_string(), 3)]));

        let second = baseline.advance_counters(HashMap::from([
            ("req".to_string(), reading(10)),
            ("new".to_string(), reading(1)),
        ]));
        assert_eq!(
            second,
            HashMap::from([("req".to_string(), 7), ("new".to_string(), 1)])
        );
    }

    #[test]
    fn test_integral_counter_reports_cumulative() {
        let mut baseline = Baseline::default();
        let total = |value| {
            HashMap::from([(
                "total".to_string(),
                CounterReading {
                    value,
                    mode: ReportingMode::Integral,
                },
            )])
        };

        assert_eq!(baseline.advance_counters(total(4))["total"], 4);
        assert_eq!(baseline.advance_counters(total(9))["total"], 9);
    }

    #[test]
    fn test_seeded_baseline() {
        let readings = HashMap::from([("req".to_string(), reading(100))]);
        let mut baseline = Baseline::seeded(&readings, HashMap::new());

        let deltas = baseline.advance_counters(HashMap::from([("req".to_string(), reading(102))]));
        assert_eq!(deltas["req"], 2);
    }

    #[test]
    fn test_advance_metrics() {
        let mut baseline = Baseline::default();

        let first = baseline.advance_metrics(HashMap::from([(
            "latency".to_string(),
            Distribution::from(Histogram::from_values([10, 20])),
        )]));
        assert_eq!(first["latency"].count(), 2);

        let second = baseline.advance_metrics(HashMap::from([(
            "latency".to_string(),
            Distribution::from(Histogram::from_values([10, 20, 30])),
        )]));
        assert_eq!(second["latency"].count(), 1);
        assert_eq!(second["latency"].sum(), 30);
    }

    #[test]
    fn test_kind_change_resets_baseline() {
        let mut baseline = Baseline::default();
        baseline.advance_metrics(HashMap::from([(
            "latency".to_string(),
            Distribution::from(Histogram::from_values([10])),
        )]));

        let summary = Distribution::from(SummaryDistribution::new(5, 50, 1, 20));
        let deltas =
            baseline.advance_metrics(HashMap::from([("latency".to_string(), summary.clone())]));
        assert_eq!(deltas["latency"], summary);
    }
}
