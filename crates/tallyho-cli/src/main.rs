//! Tallyho - synthetic load driver.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tallyho_cli::{
    wait_for_shutdown, Args, DriverConfig, JsonReporter, LoadGenerator, OutputFormat, RegistryMode,
    ShutdownReason,
};
use tallyho_core::{
    AsyncRegistry, CollectionScheduler, Collector, FilterMode, FilteringReporter, LogReporter,
    MetricsRegistry, Registry, Reporter,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tallyho=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = args.into_config()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        period_ms = config.period.as_millis() as u64,
        workers = config.workers,
        rate = config.rate,
        output = ?config.output,
        registry = ?config.registry,
        "starting load driver"
    );

    let started = Instant::now();
    let inner = Arc::new(MetricsRegistry::new());
    let queued = match &config.registry {
        RegistryMode::Direct => None,
        RegistryMode::Queued(queue) => {
            Some(Arc::new(AsyncRegistry::with_config(Arc::clone(&inner), queue.clone())?))
        }
    };
    let registry: Arc<dyn Registry> = match &queued {
        Some(queued) => Arc::clone(queued) as Arc<dyn Registry>,
        None => Arc::clone(&inner) as Arc<dyn Registry>,
    };
    registry.set_label("driver.version", env!("CARGO_PKG_VERSION"))?;
    registry.register_gauge(
        "driver.uptime_secs",
        Arc::new(move || started.elapsed().as_secs_f64()),
    );

    let collector = Arc::new(Collector::new(Arc::clone(&registry)));
    collector.add_reporter(build_reporter(&config));

    let load = LoadGenerator::new(Arc::clone(&registry), config.workers, config.rate);
    load.register_gauges();

    let scheduler = CollectionScheduler::current()?;
    scheduler.schedule(Arc::clone(&collector), config.period)?;

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let workers = load.spawn(stop_rx);

    // Wait for the run time to elapse or for ctrl+c
    match wait_for_shutdown(config.run_for).await? {
        ShutdownReason::Elapsed => tracing::info!("run time elapsed"),
        ShutdownReason::Signal => tracing::info!("received shutdown signal"),
    }

    let _ = stop_tx.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::warn!(error = %e, "load worker failed");
        }
    }
    scheduler.stop();

    if let Some(queued) = &queued {
        queued.flush()?;
        tracing::info!(dropped = queued.dropped(), "queue drained");
        queued.shutdown();
    }

    let summary = collector.full_summary();
    let requests = summary.counters().get("http.requests").copied().unwrap_or(0);
    let latency = summary.metrics().get("http.latency_ms");
    tracing::info!(
        operations = load.operations(),
        requests,
        errors = summary.counters().get("http.errors").copied().unwrap_or(0),
        latency_p50 = latency.map(|d| d.percentile(0.5)).unwrap_or(0),
        latency_p99 = latency.map(|d| d.percentile(0.99)).unwrap_or(0),
        elapsed_ms = summary.span().num_milliseconds(),
        "load driver finished"
    );

    Ok(())
}

fn build_reporter(config: &DriverConfig) -> Arc<dyn Reporter> {
    let mut reporter: Arc<dyn Reporter> = match config.output {
        OutputFormat::Log => Arc::new(LogReporter::new()),
        OutputFormat::Json => Arc::new(JsonReporter::stdout()),
    };
    if !config.include.is_empty() {
        reporter = Arc::new(FilteringReporter::new(
            reporter,
            config.include.clone(),
            FilterMode::Include,
        ));
    }
    if !config.exclude.is_empty() {
        reporter = Arc::new(FilteringReporter::new(
            reporter,
            config.exclude.clone(),
            FilterMode::Exclude,
        ));
    }
    reporter
}
