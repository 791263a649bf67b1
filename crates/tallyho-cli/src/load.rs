//! Synthetic request load.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tallyho_core::{Registry, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Simulates a small web service writing into a registry.
///
/// Each worker records a request counter, a latency observation, an
/// occasional error, and every so often a database batch.
pub struct LoadGenerator {
    registry: Arc<dyn Registry>,
    workers: usize,
    rate: u64,
    active: Arc<AtomicUsize>,
    operations: Arc<AtomicU64>,
}

impl LoadGenerator {
    /// Create a generator with `workers` tasks doing `rate` operations per
    /// second each.
    pub fn new(registry: Arc<dyn Registry>, workers: usize, rate: u64) -> Self {
        Self {
            registry,
            workers: workers.max(1),
            rate: rate.max(1),
            active: Arc::new(AtomicUsize::new(0)),
            operations: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register gauges describing the generator itself.
    pub fn register_gauges(&self) {
        let active = Arc::clone(&self.active);
        self.registry.register_gauge(
            "load.active_workers",
            Arc::new(move || active.load(Ordering::Relaxed) as f64),
        );
        let operations = Arc::clone(&self.operations);
        self.registry.register_gauge(
            "load.operations",
            Arc::new(move || operations.load(Ordering::Relaxed) as f64),
        );
    }

    /// Total operations performed so far.
    pub fn operations(&self) -> u64 {
        self.operations.load(Ordering::Relaxed)
    }

    /// Spawn the workers on the current runtime. They run until `shutdown`
    /// changes or the registry refuses a write.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let period = tick_period(self.rate);
        (0..self.workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    registry: Arc::clone(&self.registry),
                    rng: StdRng::from_entropy(),
                    operations: Arc::clone(&self.operations),
                };
                let active = Arc::clone(&self.active);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    active.fetch_add(1, Ordering::Relaxed);
                    worker.run(period, shutdown).await;
                    active.fetch_sub(1, Ordering::Relaxed);
                })
            })
            .collect()
    }
}

/// Interval between operations at `rate` per second, never zero.
fn tick_period(rate: u64) -> Duration {
    Duration::from_secs_f64(1.0 / rate.max(1) as f64).max(Duration::from_nanos(1))
}

struct Worker {
    id: usize,
    registry: Arc<dyn Registry>,
    rng: StdRng,
    operations: Arc<AtomicU64>,
}

impl Worker {
    async fn run(mut self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::debug!(worker = self.id, "load worker started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }
            if let Err(e) = self.step() {
                tracing::debug!(worker = self.id, error = %e, "load worker stopping");
                break;
            }
        }

        tracing::debug!(worker = self.id, "load worker stopped");
    }

    fn step(&mut self) -> Result<()> {
        let ops = self.operations.fetch_add(1, Ordering::Relaxed) + 1;

        self.registry.incr_one("http.requests")?;
        let latency = self.latency_ms();
        self.registry.add("http.latency_ms", latency)?;
        if self.rng.gen_bool(0.02) {
            self.registry.incr_one("http.errors")?;
        }

        if ops % 50 == 0 {
            let rows = self.rng.gen_range(1..500);
            self.registry.incr("db.batches", 1)?;
            self.registry.add("db.batch_rows", rows)?;
            self.registry
                .set_label("db.last_batch_worker", &self.id.to_string())?;
        }
        Ok(())
    }

    /// Mostly fast responses with a slow tail.
    fn latency_ms(&mut self) -> i64 {
        if self.rng.gen_bool(0.05) {
            self.rng.gen_range(200..2_000)
        } else {
            self.rng.gen_range(1..60)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tallyho_core::MetricsRegistry;

    #[tokio::test]
    async fn test_workers_record_and_stop() {
        let registry = Arc::new(MetricsRegistry::new());
        let load = LoadGenerator::new(registry.clone(), 2, 1000);
        load.register_gauges();

        let (stop_tx, stop_rx) = watch::channel(false);
        let handles = load.spawn(stop_rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop_tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        let requests = registry.counters()["http.requests"];
        assert!(requests > 0);
        assert_eq!(requests as u64, load.operations());
        assert_eq!(registry.metrics()["http.latency_ms"].count(), requests);
        assert_eq!(registry.gauges()["load.active_workers"], 0.0);
    }

    #[test]
    fn test_tick_period_never_zero() {
        assert_eq!(tick_period(1000), Duration::from_millis(1));
        assert_eq!(tick_period(0), Duration::from_secs(1));
        assert_eq!(tick_period(u64::MAX), Duration::from_nanos(1));
        assert_eq!(tick_period(5_000_000_000), Duration::from_nanos(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_extreme_rate_does_not_panic() {
        let registry = Arc::new(MetricsRegistry::new());
        let load = LoadGenerator::new(registry.clone(), 1, u64::MAX);

        let (stop_tx, stop_rx) = watch::channel(false);
        let handles = load.spawn(stop_rx);
        tokio::time::sleep(Duration::from_millis(10)).await;
        stop_tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(load.operations() > 0);
    }
}
