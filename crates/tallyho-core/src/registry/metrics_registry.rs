//! Synchronous registry backed by one concurrent map per family.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::{CounterReading, Registry};
use crate::config::RegistryConfig;
use crate::error::Result;
use crate::metrics::{
    Counter, Distribution, Gauge, HistogramMetric, Metric, ReportingMode, SummaryMetric,
};
use crate::snapshot::Snapshot;

/// Registry that applies every call directly.
///
/// Lookups of existing names take a shard read lock only; creation goes
/// through the map's entry API so racing creators all observe the first
/// inserted instance. No lock spans two families.
///
/// A metric's kind is fixed by whatever creates it: observations and
/// histogram pushes create a histogram metric, a summary push creates a
/// summary metric.
pub struct MetricsRegistry {
    config: RegistryConfig,
    /// Start of the cumulative window.
    started_at: RwLock<DateTime<Utc>>,

    counters: DashMap<String, Arc<Counter>>,
    metrics: DashMap<String, Arc<dyn Metric>>,
    labels: DashMap<String, String>,
    gauges: DashMap<String, Arc<dyn Gauge>>,
}

impl MetricsRegistry {
    /// Create a registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with an explicit configuration.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            started_at: RwLock::new(Utc::now()),
            counters: DashMap::new(),
            metrics: DashMap::new(),
            labels: DashMap::new(),
            gauges: DashMap::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Start of the current cumulative window.
    pub fn started_at(&self) -> DateTime<Utc> {
        *self.started_at.read()
    }

    /// Get or create a metric, building it with `create` if absent.
    fn metric_entry(
        &self,
        name: &str,
        create: impl FnOnce() -> Arc<dyn Metric>,
    ) -> Arc<dyn Metric> {
        if let Some(existing) = self.metrics.get(name) {
            return Arc::clone(existing.value());
        }
        let entry = self.metrics.entry(name.to_string()).or_insert_with(create);
        Arc::clone(entry.value())
    }

    fn histogram_entry(&self, name: &str) -> Arc<dyn Metric> {
        let policy = self.config.negative_values;
        self.metric_entry(name, || Arc::new(HistogramMetric::with_policy(policy)))
    }

    /// Look up a metric without creating it.
    pub fn find_metric(&self, name: &str) -> Option<Arc<dyn Metric>> {
        self.metrics.get(name).map(|m| Arc::clone(m.value()))
    }

    fn counter_entry(&self, name: &str, mode: ReportingMode) -> Arc<Counter> {
        if let Some(existing) = self.counters.get(name) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Counter::with_mode(mode)));
        Arc::clone(entry.value())
    }
}

impl Registry for MetricsRegistry {
    fn add(&self, name: &str, value: i64) -> Result<()> {
        self.histogram_entry(name).add(value)
    }

    fn add_distribution(&self, name: &str, distribution: Distribution) -> Result<()> {
        let metric = match distribution {
            Distribution::Histogram(_) => self.histogram_entry(name),
            Distribution::Summary(_) => {
                let policy = self.config.negative_values;
                self.metric_entry(name, || Arc::new(SummaryMetric::with_policy(policy)))
            }
        };
        metric.merge(&distribution)
    }

    fn incr(&self, name: &str, n: i64) -> Result<()> {
        self.counter_entry(name, ReportingMode::Differential).incr_by(n);
        Ok(())
    }

    fn set_label(&self, name: &str, value: &str) -> Result<()> {
        self.labels.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn clear_label(&self, name: &str) -> Result<()> {
        self.labels.remove(name);
        Ok(())
    }

    fn clear_metric(&self, name: &str) -> Result<()> {
        if let Some(metric) = self.find_metric(name) {
            metric.clear();
        }
        Ok(())
    }

    fn clear_counter(&self, name: &str) -> Result<()> {
        if let Some(counter) = self.counters.get(name) {
            counter.reset();
        }
        Ok(())
    }

    fn counter_with_mode(&self, name: &str, mode: ReportingMode) -> Arc<Counter> {
        self.counter_entry(name, mode)
    }

    fn metric(&self, name: &str) -> Arc<dyn Metric> {
        self.histogram_entry(name)
    }

    fn label(&self, name: &str) -> Option<String> {
        self.labels.get(name).map(|v| v.value().clone())
    }

    fn register_gauge(&self, name: &str, gauge: Arc<dyn Gauge>) {
        match self.gauges.entry(name.to_string()) {
            Entry::Occupied(_) => {
                tracing::debug!(gauge = name, "gauge already registered, keeping existing");
            }
            Entry::Vacant(slot) => {
                slot.insert(gauge);
            }
        }
    }

    fn deregister_gauge(&self, name: &str) {
        self.gauges.remove(name);
    }

    fn counter_readings(&self) -> HashMap<String, CounterReading> {
        self.counters
            .iter()
            .map(|entry| {
                let counter = entry.value();
                (
                    entry.key().clone(),
                    CounterReading {
                        value: counter.value(),
                        mode: counter.mode(),
                    },
                )
            })
            .collect()
    }

    fn metrics(&self) -> HashMap<String, Distribution> {
        // Release shard locks before taking per-metric mutexes.
        let metrics: Vec<(String, Arc<dyn Metric>)> = self
            .metrics
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        metrics
            .into_iter()
            .map(|(name, metric)| (name, metric.snapshot()))
            .collect()
    }

    fn labels(&self) -> HashMap<String, String> {
        self.labels
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    fn gauges(&self) -> HashMap<String, f64> {
        // Suppliers may call back into the registry.
        let gauges: Vec<(String, Arc<dyn Gauge>)> = self
            .gauges
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        gauges
            .into_iter()
            .map(|(name, gauge)| (name, gauge.read()))
            .collect()
    }

    fn clear_all(&self) {
        self.counters.clear();
        self.metrics.clear();
        self.labels.clear();
        *self.started_at.write() = Utc::now();
        tracing::debug!("registry cleared");
    }

    fn snapshot(&self) -> Snapshot {
        let start = self.started_at();
        Snapshot::new(
            self.counters(),
            self.metrics(),
            self.labels(),
            self.gauges(),
            start,
            Utc::now(),
        )
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("counters", &self.counters.len())
            .field("metrics", &self.metrics.len())
            .field("labels", &self.labels.len())
            .field("gauges", &self.gauges.len())
            .finish()
    }
}

/// Shared registry handle.
pub type SharedRegistry = Arc<MetricsRegistry>;

/// Create a new shared registry.
pub fn new_shared_registry() -> SharedRegistry {
    Arc::new(MetricsRegistry::new())
}
