//! Stopwatch that records elapsed milliseconds into a registry metric.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::registry::Registry;

/// Suffix appended to every timer metric name.
pub const TIMER_SUFFIX: &str = ".millis";

/// One recorded stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerRecord {
    /// Metric the elapsed time was recorded under.
    pub metric: String,
    /// Elapsed milliseconds.
    pub millis: u64,
}

impl fmt::Display for TimerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.metric, self.millis)
    }
}

#[derive(Debug, Default)]
struct TimerState {
    started_at: Option<Instant>,
    elapsed_ms: u64,
}

/// Timer bound to a registry and a base name.
///
/// `stop` records `<name>.millis`, `stop_milestone` records
/// `<name>-<milestone>.millis`; spaces in either part become underscores.
/// A single running flag guards the stop transition, so concurrent stoppers
/// record at most once per start.
pub struct Timer {
    name: String,
    safe_name: String,
    registry: Arc<dyn Registry>,
    running: AtomicBool,
    state: Mutex<TimerState>,
    history: Mutex<Vec<TimerRecord>>,
}

impl Timer {
    /// Create a stopped timer.
    pub fn new(registry: Arc<dyn Registry>, name: impl Into<String>) -> Self {
        let name = name.into();
        let safe_name = name.replace(' ', "_");
        Self {
            name,
            safe_name,
            registry,
            running: AtomicBool::new(false),
            state: Mutex::new(TimerState::default()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Create a timer that is already running.
    pub fn started(registry: Arc<dyn Registry>, name: impl Into<String>) -> Self {
        let timer = Self::new(registry, name);
        timer.start();
        timer
    }

    /// The name as given.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name as it appears in metric names.
    pub fn safe_name(&self) -> &str {
        &self.safe_name
    }

    /// Check whether the timer is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start, or restart, the timer.
    pub fn start(&self) {
        let mut state = self.state.lock();
        state.started_at = Some(Instant::now());
        state.elapsed_ms = 0;
        self.running.store(true, Ordering::Release);
    }

    /// Milliseconds since start while running, or the frozen value once stopped.
    pub fn elapsed(&self) -> u64 {
        let state = self.state.lock();
        if self.is_running() {
            state.started_at.map_or(0, |at| millis_since(at))
        } else {
            state.elapsed_ms
        }
    }

    /// Stop and record under `<name>.millis`.
    pub fn stop(&self) -> u64 {
        self.stop_inner(None)
    }

    /// Stop and record under `<name>-<milestone>.millis`.
    pub fn stop_milestone(&self, milestone: &str) -> u64 {
        self.stop_inner(Some(milestone))
    }

    /// Stop at a milestone, then start again.
    pub fn stop_and_start(&self, milestone: &str) -> u64 {
        let elapsed = self.stop_milestone(milestone);
        self.start();
        elapsed
    }

    /// Records of every stop since creation, oldest first.
    pub fn history(&self) -> Vec<TimerRecord> {
        self.history.lock().clone()
    }

    /// Metric name for an optional milestone.
    pub fn metric_name(&self, milestone: Option<&str>) -> String {
        let mut metric = self.safe_name.clone();
        if let Some(milestone) = milestone {
            metric.push('-');
            metric.push_str(&milestone.replace(' ', "_"));
        }
        metric.push_str(TIMER_SUFFIX);
        metric
    }

    fn stop_inner(&self, milestone: Option<&str>) -> u64 {
        let mut state = self.state.lock();
        if !self.running.swap(false, Ordering::AcqRel) {
            return state.elapsed_ms;
        }

        let elapsed = state.started_at.map_or(0, |at| millis_since(at));
        state.elapsed_ms = elapsed;
        drop(state);

        let metric = self.metric_name(milestone);
        if let Err(e) = self.registry.add(&metric, elapsed as i64) {
            tracing::warn!(metric = %metric, error = %e, "failed to record timer");
        }
        self.history.lock().push(TimerRecord {
            metric,
            millis: elapsed,
        });
        elapsed
    }
}

fn millis_since(at: Instant) -> u64 {
    u64::try_from(at.elapsed().as_millis()).unwrap_or(u64::MAX)
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("elapsed_ms", &self.elapsed())
            .finish()
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in self.history.lock().iter() {
            write!(f, "{} : ", record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MetricsRegistry;
    use std::time::Duration;

    fn registry() -> Arc<MetricsRegistry> {
        Arc::new(MetricsRegistry::new())
    }

    #[test]
    fn test_metric_names() {
        let timer = Timer::new(registry(), "db query");
        assert_eq!(timer.safe_name(), "db_query");
        assert_eq!(timer.metric_name(None), "db_query.millis");
        assert_eq!(timer.metric_name(Some("fetch rows")), "db_query-fetch_rows.millis");
    }

    #[test]
    fn test_stop_records_metric() {
        let registry = registry();
        let timer = Timer::started(registry.clone(), "load");
        std::thread::sleep(Duration::from_millis(5));
        let elapsed = timer.stop();

        assert!(elapsed >= 5);
        assert!(!timer.is_running());
        let dist = registry.metrics().remove("load.millis").unwrap();
        assert_eq!(dist.count(), 1);
        assert_eq!(dist.sum(), elapsed as i64);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let registry = registry();
        let timer = Timer::started(registry.clone(), "job");
        let first = timer.stop();
        std::thread::sleep(Duration::from_millis(2));
        let second = timer.stop();

        assert_eq!(first, second);
        assert_eq!(timer.elapsed(), first);
        assert_eq!(registry.metrics()["job.millis"].count(), 1);
    }

    #[test]
    fn test_stop_without_start_records_nothing() {
        let registry = registry();
        let timer = Timer::new(registry.clone(), "idle");
        assert_eq!(timer.stop(), 0);
        assert!(registry.metrics().is_empty());
    }

    #[test]
    fn test_stop_and_start_milestones() {
        let registry = registry();
        let timer = Timer::started(registry.clone(), "request");
        timer.stop_and_start("parse");
        timer.stop_and_start("execute");
        timer.stop();

        let metrics = registry.metrics();
        assert_eq!(metrics["request-parse.millis"].count(), 1);
        assert_eq!(metrics["request-execute.millis"].count(), 1);
        assert_eq!(metrics["request.millis"].count(), 1);

        let history = timer.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].metric, "request-parse.millis");
        assert!(timer.to_string().starts_with("request-parse.millis["));
    }

    #[test]
    fn test_concurrent_stop_records_once() {
        let registry = registry();
        let timer = Arc::new(Timer::started(registry.clone(), "race"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let timer = Arc::clone(&timer);
                std::thread::spawn(move || timer.stop())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.metrics()["race.millis"].count(), 1);
    }
}
