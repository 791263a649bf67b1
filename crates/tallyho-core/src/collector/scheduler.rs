//! Fixed-rate collection ticks on a tokio runtime.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::Collector;
use crate::error::{Error, Result};

/// Handle for a scheduled collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleId(u64);

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schedule-{}", self.0)
    }
}

struct ScheduledTask {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Runs [`Collector::collect`] periodically.
///
/// Each schedule is a task on the given runtime. The first tick fires
/// immediately; a tick that falls behind is skipped rather than bunched
/// up. Collection itself runs on the blocking pool, and the next tick is
/// not started until the previous one returns.
pub struct CollectionScheduler {
    handle: Handle,
    tasks: Mutex<HashMap<ScheduleId, ScheduledTask>>,
    next_id: AtomicU64,
}

impl CollectionScheduler {
    /// Create a scheduler that spawns onto `handle`.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            tasks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a scheduler on the runtime the caller is running in.
    pub fn current() -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| Error::Config(format!("no tokio runtime available: {e}")))?;
        Ok(Self::new(handle))
    }

    /// Collect every `period` until cancelled.
    pub fn schedule(&self, collector: Arc<Collector>, period: Duration) -> Result<ScheduleId> {
        if period.is_zero() {
            return Err(Error::Config("collection period must be non-zero".into()));
        }

        let id = ScheduleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = self.handle.spawn(run_schedule(id, collector, period, stop_rx));

        self.tasks.lock().insert(
            id,
            ScheduledTask {
                stop: stop_tx,
                task,
            },
        );
        tracing::info!(schedule = %id, period_ms = period.as_millis() as u64, "collection scheduled");
        Ok(id)
    }

    /// Stop one schedule. Returns whether it was active.
    ///
    /// A tick already in progress runs to completion.
    pub fn cancel(&self, id: ScheduleId) -> bool {
        match self.tasks.lock().remove(&id) {
            Some(scheduled) => {
                let _ = scheduled.stop.send(true);
                tracing::debug!(schedule = %id, "collection cancelled");
                true
            }
            None => false,
        }
    }

    /// Stop every schedule.
    pub fn stop(&self) {
        let tasks: Vec<(ScheduleId, ScheduledTask)> = self.tasks.lock().drain().collect();
        for (id, scheduled) in tasks {
            let _ = scheduled.stop.send(true);
            tracing::debug!(schedule = %id, "collection stopped");
        }
    }

    /// Number of active schedules.
    pub fn active(&self) -> usize {
        self.tasks
            .lock()
            .values()
            .filter(|scheduled| !scheduled.task.is_finished())
            .count()
    }
}

impl Drop for CollectionScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for CollectionScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionScheduler")
            .field("schedules", &self.tasks.lock().len())
            .finish()
    }
}

async fn run_schedule(
    id: ScheduleId,
    collector: Arc<Collector>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = interval.tick() => {}
        }
        if *stop.borrow() {
            break;
        }

        let tick_collector = Arc::clone(&collector);
        match tokio::task::spawn_blocking(move || tick_collector.collect()).await {
            Ok(snapshot) => {
                tracing::trace!(schedule = %id, counters = snapshot.counters().len(), "tick");
            }
            Err(e) if e.is_panic() => {
                tracing::error!(schedule = %id, "collection panicked");
            }
            Err(e) => {
                tracing::debug!(schedule = %id, error = %e, "collection task cancelled");
                break;
            }
        }
    }

    tracing::debug!(schedule = %id, "collection task stopping");
}
