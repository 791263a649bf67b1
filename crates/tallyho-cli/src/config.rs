//! Driver configuration.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use tallyho_core::{AsyncRegistryConfig, NamePattern, OverflowPolicy};

use crate::error::Error;

/// Default collection period in milliseconds.
pub const DEFAULT_PERIOD_MS: u64 = 1000;

/// Default operations per second per worker.
pub const DEFAULT_RATE: u64 = 200;

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(4)
        .clamp(1, 4)
}

/// How each tick is written out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// One tracing event per entry.
    #[default]
    Log,
    /// One JSON document per tick on stdout.
    Json,
}

/// Which registry the load generator writes through.
#[derive(Debug, Clone)]
pub enum RegistryMode {
    /// Apply every call directly.
    Direct,
    /// Queue mutations to a background consumer.
    Queued(AsyncRegistryConfig),
}

/// Driver configuration.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Collection period.
    pub period: Duration,

    /// Total run time. None runs until interrupted.
    pub run_for: Option<Duration>,

    /// Number of load generator tasks.
    pub workers: usize,

    /// Operations per second per worker.
    pub rate: u64,

    /// Output format for ticks.
    pub output: OutputFormat,

    /// Registry the load goes through.
    pub registry: RegistryMode,

    /// Names to keep. Empty keeps everything.
    pub include: Vec<NamePattern>,

    /// Names to drop.
    pub exclude: Vec<NamePattern>,
}

impl DriverConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self {
            period: Duration::from_millis(DEFAULT_PERIOD_MS),
            run_for: None,
            workers: default_workers(),
            rate: DEFAULT_RATE,
            output: OutputFormat::default(),
            registry: RegistryMode::Direct,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    /// Set the collection period.
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Stop after `run_for`.
    pub fn with_run_for(mut self, run_for: Duration) -> Self {
        self.run_for = Some(run_for);
        self
    }

    /// Set the number of load generator tasks.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the per-worker operation rate.
    pub fn with_rate(mut self, rate: u64) -> Self {
        self.rate = rate.max(1);
        self
    }

    /// Set the output format.
    pub fn with_output(mut self, output: OutputFormat) -> Self {
        self.output = output;
        self
    }

    /// Route load through a queued registry.
    pub fn with_queue(mut self, queue: AsyncRegistryConfig) -> Self {
        self.registry = RegistryMode::Queued(queue);
        self
    }

    /// Check whether any name filter is configured.
    pub fn has_filters(&self) -> bool {
        !self.include.is_empty() || !self.exclude.is_empty()
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Command-line arguments for the driver.
#[derive(Parser, Debug)]
#[command(name = "tallyho")]
#[command(version, about = "Run synthetic load through a tallyho registry", long_about = None)]
pub struct Args {
    /// Collection period in milliseconds.
    #[arg(short, long, default_value_t = DEFAULT_PERIOD_MS)]
    pub period_ms: u64,

    /// Stop after this many seconds. 0 runs until interrupted.
    #[arg(short, long, default_value_t = 0)]
    pub duration: u64,

    /// Load generator tasks (0 = auto).
    #[arg(short, long, default_value_t = 0)]
    pub workers: usize,

    /// Operations per second per worker.
    #[arg(long, default_value_t = DEFAULT_RATE)]
    pub rate: u64,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Log)]
    pub output: OutputFormat,

    /// Queue mutations to a background consumer.
    #[arg(long)]
    pub queued: bool,

    /// Bound the mutation queue (0 = unbounded).
    #[arg(long, default_value_t = 0)]
    pub queue_capacity: usize,

    /// Drop mutations when the bounded queue is full instead of blocking.
    #[arg(long)]
    pub drop_on_full: bool,

    /// Only report names matching this pattern (repeatable).
    #[arg(long)]
    pub include: Vec<String>,

    /// Never report names matching this pattern (repeatable).
    #[arg(long)]
    pub exclude: Vec<String>,
}

impl Args {
    /// Convert command-line arguments to driver configuration.
    pub fn into_config(self) -> Result<DriverConfig, Error> {
        if self.period_ms == 0 {
            return Err(Error::Config("period must be non-zero".into()));
        }

        let mut config = DriverConfig::new()
            .with_period(Duration::from_millis(self.period_ms))
            .with_rate(self.rate)
            .with_output(self.output);

        if self.duration > 0 {
            config = config.with_run_for(Duration::from_secs(self.duration));
        }
        if self.workers > 0 {
            config = config.with_workers(self.workers);
        }

        if self.queued {
            let mut queue = AsyncRegistryConfig::new();
            if self.queue_capacity > 0 {
                queue = queue.with_capacity(self.queue_capacity);
            }
            if self.drop_on_full {
                queue = queue.with_overflow(OverflowPolicy::Drop);
            }
            config = config.with_queue(queue);
        } else if self.queue_capacity > 0 || self.drop_on_full {
            return Err(Error::Config(
                "--queue-capacity and --drop-on-full require --queued".into(),
            ));
        }

        config.include = parse_patterns(&self.include)?;
        config.exclude = parse_patterns(&self.exclude)?;
        Ok(config)
    }
}

fn parse_patterns(patterns: &[String]) -> Result<Vec<NamePattern>, Error> {
    patterns
        .iter()
        .map(|p| NamePattern::new(p).map_err(Error::from))
        .collect()
}
