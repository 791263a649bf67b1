//! Snapshot consumers.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::Level;

use crate::snapshot::{NamePattern, Snapshot};

/// Errors returned by a reporter.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Generic failure.
    #[error("report failed: {0}")]
    Failed(String),

    /// I/O error while writing the report.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Receiver of collected snapshots.
///
/// The collector calls `report` synchronously on its own thread, once per
/// tick, with the same snapshot for every reporter. Errors and panics are
/// logged by the collector and never reach other reporters.
pub trait Reporter: Send + Sync {
    /// Name used in log events.
    fn name(&self) -> &str;

    /// Handle one snapshot.
    fn report(&self, snapshot: &Snapshot) -> Result<(), ReportError>;
}

macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {{
        let level = $level;
        if level == Level::ERROR {
            tracing::error!($($arg)+)
        } else if level == Level::WARN {
            tracing::warn!($($arg)+)
        } else if level == Level::INFO {
            tracing::info!($($arg)+)
        } else if level == Level::DEBUG {
            tracing::debug!($($arg)+)
        } else {
            tracing::trace!($($arg)+)
        }
    }};
}

/// Reporter that emits one `tracing` event per snapshot entry.
#[derive(Debug, Clone)]
pub struct LogReporter {
    level: Level,
}

impl LogReporter {
    /// Create a reporter logging at `INFO`.
    pub fn new() -> Self {
        Self { level: Level::INFO }
    }

    /// Set the event level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

impl Default for LogReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for LogReporter {
    fn name(&self) -> &str {
        "log"
    }

    fn report(&self, snapshot: &Snapshot) -> Result<(), ReportError> {
        let level = self.level;
        event_at!(
            level,
            start = %snapshot.start().to_rfc3339(),
            span_ms = snapshot.span().num_milliseconds(),
            "metrics snapshot"
        );

        for (name, value) in sorted(snapshot.counters()) {
            event_at!(level, counter = %name, value, "counter");
        }
        for (name, dist) in sorted(snapshot.metrics()) {
            let stats = dist.summary_map();
            let stat = |key: &str| stats.get(key).copied().unwrap_or(0.0);
            event_at!(
                level,
                metric = %name,
                count = dist.count(),
                mean = stat("mean"),
                p50 = stat("p50"),
                p99 = stat("p99"),
                max = stat("maximum"),
                "metric"
            );
        }
        for (name, value) in sorted(snapshot.labels()) {
            event_at!(level, label = %name, value = %value, "label");
        }
        for (name, value) in sorted(snapshot.gauges()) {
            event_at!(level, gauge = %name, value, "gauge");
        }
        Ok(())
    }
}

fn sorted<V: Clone>(map: &std::collections::HashMap<String, V>) -> BTreeMap<&str, V> {
    map.iter().map(|(k, v)| (k.as_str(), v.clone())).collect()
}

/// Whether a [`FilteringReporter`] keeps or drops matching names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Keep names matching every pattern.
    #[default]
    Include,
    /// Drop names matching any pattern.
    Exclude,
}

/// Reporter that narrows snapshots by name before passing them on.
pub struct FilteringReporter {
    name: String,
    inner: Arc<dyn Reporter>,
    patterns: Vec<NamePattern>,
    mode: FilterMode,
}

impl FilteringReporter {
    /// Wrap `inner`, applying `patterns` in the given mode.
    pub fn new(inner: Arc<dyn Reporter>, patterns: Vec<NamePattern>, mode: FilterMode) -> Self {
        let name = format!("filter({})", inner.name());
        Self {
            name,
            inner,
            patterns,
            mode,
        }
    }

    /// Keep only names matching every pattern.
    pub fn include(inner: Arc<dyn Reporter>, patterns: Vec<NamePattern>) -> Self {
        Self::new(inner, patterns, FilterMode::Include)
    }

    /// Drop names matching any pattern.
    pub fn exclude(inner: Arc<dyn Reporter>, patterns: Vec<NamePattern>) -> Self {
        Self::new(inner, patterns, FilterMode::Exclude)
    }

    /// Apply the patterns to a snapshot.
    pub fn apply(&self, snapshot: &Snapshot) -> Snapshot {
        self.patterns
            .iter()
            .fold(snapshot.clone(), |snap, pattern| match self.mode {
                FilterMode::Include => snap.filter(pattern),
                FilterMode::Exclude => snap.filter_out(pattern),
            })
    }
}

impl Reporter for FilteringReporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn report(&self, snapshot: &Snapshot) -> Result<(), ReportError> {
        self.inner.report(&self.apply(snapshot))
    }
}

impl std::fmt::Debug for FilteringReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilteringReporter")
            .field("name", &self.name)
            .field("patterns", &self.patterns)
            .field("mode", &self.mode)
            .finish()
    }
}
