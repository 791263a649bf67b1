//! Registry wrapper that applies mutations on a background thread.
//!
//! Mutations are turned into commands and pushed onto a channel; a single
//! consumer thread applies them to the wrapped [`MetricsRegistry`] in
//! submission order. Reads go straight to the wrapped registry and may lag
//! behind writes that are still queued. [`AsyncRegistry::flush`] waits until
//! everything submitted before it has been applied.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use super::{CounterReading, MetricsRegistry, Registry};
use crate::config::{AsyncRegistryConfig, OverflowPolicy};
use crate::error::{Error, Result};
use crate::metrics::{Counter, Distribution, Gauge, Metric, ReportingMode};
use crate::snapshot::Snapshot;

const CONSUMER_THREAD_NAME: &str = "tallyho-async-registry";

/// A queued mutation.
enum Command {
    Add { name: String, value: i64 },
    AddDistribution { name: String, distribution: Distribution },
    Incr { name: String, n: i64 },
    SetLabel { name: String, value: String },
    ClearLabel { name: String },
    ClearMetric { name: String },
    ClearCounter { name: String },
    Flush(Sender<()>),
}

/// Producer side of the command channel, shared with forwarding metrics.
struct CommandQueue {
    sender: Sender<Command>,
    overflow: OverflowPolicy,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl CommandQueue {
    fn submit(&self, command: Command) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::RegistryClosed);
        }

        match self.overflow {
            OverflowPolicy::Block => self.sender.send(command).map_err(|_| Error::RegistryClosed),
            OverflowPolicy::Drop => match self.sender.try_send(command) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    tracing::trace!(dropped, "registry queue full, dropping command");
                    Ok(())
                }
                Err(TrySendError::Disconnected(_)) => Err(Error::RegistryClosed),
            },
        }
    }

    fn flush(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::RegistryClosed);
        }

        // The marker is never dropped, whatever the overflow policy.
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        self.sender
            .send(Command::Flush(ack_tx))
            .map_err(|_| Error::RegistryClosed)?;
        ack_rx.recv().map_err(|_| Error::RegistryClosed)
    }
}

/// Registry whose mutations never contend with other callers.
///
/// Counter handles returned by [`Registry::counter`], `clear_all`, gauge
/// registration and every read operate on the wrapped registry directly.
pub struct AsyncRegistry {
    inner: Arc<MetricsRegistry>,
    queue: Arc<CommandQueue>,
    /// Dropping the sender stops the consumer.
    shutdown: Mutex<Option<Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AsyncRegistry {
    /// Wrap a registry with an unbounded queue.
    pub fn new(inner: Arc<MetricsRegistry>) -> Result<Self> {
        Self::with_config(inner, AsyncRegistryConfig::default())
    }

    /// Wrap a registry with an explicit queue configuration.
    pub fn with_config(inner: Arc<MetricsRegistry>, config: AsyncRegistryConfig) -> Result<Self> {
        config.validate()?;

        let (sender, receiver) = match config.capacity {
            Some(capacity) => crossbeam_channel::bounded(capacity),
            None => crossbeam_channel::unbounded(),
        };
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);

        let consumer_registry = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name(CONSUMER_THREAD_NAME.to_string())
            .spawn(move || consumer_loop(consumer_registry, receiver, shutdown_rx))
            .map_err(Error::ConsumerSpawn)?;

        tracing::debug!(
            capacity = ?config.capacity,
            overflow = ?config.overflow,
            "async registry started"
        );

        Ok(Self {
            inner,
            queue: Arc::new(CommandQueue {
                sender,
                overflow: config.overflow,
                dropped: AtomicU64::new(0),
                closed: AtomicBool::new(false),
            }),
            shutdown: Mutex::new(Some(shutdown_tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// The wrapped registry.
    pub fn inner(&self) -> &Arc<MetricsRegistry> {
        &self.inner
    }

    /// Wait until every command submitted before this call has been applied.
    ///
    /// Blocks the calling thread.
    pub fn flush(&self) -> Result<()> {
        self.queue.flush()
    }

    /// Number of commands waiting for the consumer.
    pub fn pending(&self) -> usize {
        self.queue.sender.len()
    }

    /// Number of commands discarded by the drop overflow policy.
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    /// Check whether the consumer has been stopped.
    pub fn is_closed(&self) -> bool {
        self.queue.closed.load(Ordering::Acquire)
    }

    /// Stop the consumer and wait for it to exit.
    ///
    /// Commands still queued may or may not be applied. Later mutations fail
    /// with [`Error::RegistryClosed`].
    pub fn shutdown(&self) {
        self.queue.closed.store(true, Ordering::Release);
        drop(self.shutdown.lock().take());

        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::error!("async registry consumer panicked");
            }
            tracing::debug!(pending = self.pending(), "async registry stopped");
        }
    }
}

impl Drop for AsyncRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for AsyncRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncRegistry")
            .field("inner", &self.inner)
            .field("pending", &self.pending())
            .field("dropped", &self.dropped())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn consumer_loop(registry: Arc<MetricsRegistry>, commands: Receiver<Command>, shutdown: Receiver<()>) {
    loop {
        let next = select! {
            recv(shutdown) -> _ => None,
            recv(commands) -> command => command.ok(),
        };
        match next {
            Some(command) => apply(&registry, command),
            None => break,
        }
    }
}

fn apply(registry: &MetricsRegistry, command: Command) {
    let result = match command {
        Command::Add { name, value } => registry.add(&name, value),
        Command::AddDistribution { name, distribution } => {
            registry.add_distribution(&name, distribution)
        }
        Command::Incr { name, n } => registry.incr(&name, n),
        Command::SetLabel { name, value } => registry.set_label(&name, &value),
        Command::ClearLabel { name } => registry.clear_label(&name),
        Command::ClearMetric { name } => registry.clear_metric(&name),
        Command::ClearCounter { name } => registry.clear_counter(&name),
        Command::Flush(ack) => {
            // The flusher may have given up waiting.
            let _ = ack.send(());
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to apply registry command");
    }
}

impl Registry for AsyncRegistry {
    fn add(&self, name: &str, value: i64) -> Result<()> {
        self.queue.submit(Command::Add {
            name: name.to_string(),
            value,
        })
    }

    fn add_distribution(&self, name: &str, distribution: Distribution) -> Result<()> {
        self.queue.submit(Command::AddDistribution {
            name: name.to_string(),
            distribution,
        })
    }

    fn incr(&self, name: &str, n: i64) -> Result<()> {
        self.queue.submit(Command::Incr {
            name: name.to_string(),
            n,
        })
    }

    fn set_label(&self, name: &str, value: &str) -> Result<()> {
        self.queue.submit(Command::SetLabel {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    fn clear_label(&self, name: &str) -> Result<()> {
        self.queue.submit(Command::ClearLabel {
            name: name.to_string(),
        })
    }

    fn clear_metric(&self, name: &str) -> Result<()> {
        self.queue.submit(Command::ClearMetric {
            name: name.to_string(),
        })
    }

    fn clear_counter(&self, name: &str) -> Result<()> {
        self.queue.submit(Command::ClearCounter {
            name: name.to_string(),
        })
    }

    fn counter_with_mode(&self, name: &str, mode: ReportingMode) -> Arc<Counter> {
        self.inner.counter_with_mode(name, mode)
    }

    fn metric(&self, name: &str) -> Arc<dyn Metric> {
        Arc::new(AsyncMetric {
            name: name.to_string(),
            queue: Arc::clone(&self.queue),
            registry: Arc::clone(&self.inner),
        })
    }

    fn label(&self, name: &str) -> Option<String> {
        self.inner.label(name)
    }

    fn register_gauge(&self, name: &str, gauge: Arc<dyn Gauge>) {
        self.inner.register_gauge(name, gauge);
    }

    fn deregister_gauge(&self, name: &str) {
        self.inner.deregister_gauge(name);
    }

    fn counter_readings(&self) -> HashMap<String, CounterReading> {
        self.inner.counter_readings()
    }

    fn metrics(&self) -> HashMap<String, Distribution> {
        self.inner.metrics()
    }

    fn labels(&self) -> HashMap<String, String> {
        self.inner.labels()
    }

    fn gauges(&self) -> HashMap<String, f64> {
        self.inner.gauges()
    }

    fn clear_all(&self) {
        self.inner.clear_all();
    }

    fn snapshot(&self) -> Snapshot {
        self.inner.snapshot()
    }
}

/// Metric handle that forwards mutations through an [`AsyncRegistry`] queue.
///
/// `snapshot` reads the wrapped registry's current distribution, so it
/// does not include observations that are still queued.
pub struct AsyncMetric {
    name: String,
    queue: Arc<CommandQueue>,
    registry: Arc<MetricsRegistry>,
}

impl AsyncMetric {
    /// Name of the forwarded metric.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Metric for AsyncMetric {
    fn add(&self, value: i64) -> Result<()> {
        self.queue.submit(Command::Add {
            name: self.name.clone(),
            value,
        })
    }

    fn merge(&self, distribution: &Distribution) -> Result<()> {
        self.queue.submit(Command::AddDistribution {
            name: self.name.clone(),
            distribution: distribution.clone(),
        })
    }

    fn clear(&self) {
        let command = Command::ClearMetric {
            name: self.name.clone(),
        };
        if let Err(e) = self.queue.submit(command) {
            tracing::warn!(metric = %self.name, error = %e, "failed to queue metric clear");
        }
    }

    fn snapshot(&self) -> Distribution {
        self.registry
            .find_metric(&self.name)
            .map(|metric| metric.snapshot())
            .unwrap_or_else(Distribution::empty)
    }
}

impl std::fmt::Debug for AsyncMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncMetric").field("name", &self.name).finish()
    }
}
