//! Data generation for benchmarks.
//!
//! Generators are seeded so runs are comparable.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tallyho_core::{MetricsRegistry, Registry};

const SEED: u64 = 0x7a11_7a11;

/// Number of distinct names a benchmark registry carries.
#[derive(Clone, Copy, Debug)]
pub enum Scale {
    /// 10 counters and 10 metrics.
    Tiny,
    /// 100 of each.
    Small,
    /// 1,000 of each.
    Medium,
}

impl Scale {
    /// Names per family at this scale.
    pub fn count(&self) -> usize {
        match self {
            Scale::Tiny => 10,
            Scale::Small => 100,
            Scale::Medium => 1_000,
        }
    }

    /// All scales, smallest first.
    pub fn all() -> [Scale; 3] {
        [Scale::Tiny, Scale::Small, Scale::Medium]
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale::Small
    }
}

/// Latency-shaped values in milliseconds: mostly small with a long tail.
pub fn latency_values(n: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(SEED);
    (0..n)
        .map(|_| {
            if rng.gen_bool(0.05) {
                rng.gen_range(200..20_000)
            } else {
                rng.gen_range(1..60)
            }
        })
        .collect()
}

/// A registry with `scale.count()` counters and metrics, each holding a few
/// observations.
pub fn populated_registry(scale: Scale) -> Arc<MetricsRegistry> {
    let registry = Arc::new(MetricsRegistry::new());
    let values = latency_values(8);
    for i in 0..scale.count() {
        let counter = format!("bench.counter.{i}");
        let metric = format!("bench.metric.{i}");
        registry
            .incr(&counter, i as i64 + 1)
            .expect("fresh registry accepts counter writes");
        for value in &values {
            registry
                .add(&metric, *value as i64)
                .expect("fresh registry accepts observations");
        }
    }
    registry
}

/// Touch every name in a populated registry once.
pub fn touch_all(registry: &dyn Registry, scale: Scale, value: i64) {
    for i in 0..scale.count() {
        registry
            .incr(&format!("bench.counter.{i}"), 1)
            .expect("registry accepts counter writes");
        registry
            .add(&format!("bench.metric.{i}"), value)
            .expect("registry accepts observations");
    }
}
