//! Integration tests for the registry, collector and scheduler.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tallyho_core::{
    AsyncRegistry, CollectionScheduler, Collector, FilteringReporter, Histogram, MetricsRegistry,
    NamePattern, Registry, ReportError, Reporter, Snapshot,
};

#[derive(Default)]
struct RecordingReporter {
    snapshots: Mutex<Vec<Snapshot>>,
}

impl RecordingReporter {
    fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.lock().clone()
    }
}

impl Reporter for RecordingReporter {
    fn name(&self) -> &str {
        "recording"
    }

    fn report(&self, snapshot: &Snapshot) -> Result<(), ReportError> {
        self.snapshots.lock().push(snapshot.clone());
        Ok(())
    }
}

struct TestContext {
    registry: Arc<MetricsRegistry>,
    collector: Arc<Collector>,
    reporter: Arc<RecordingReporter>,
}

impl TestContext {
    fn new() -> Self {
        let registry = Arc::new(MetricsRegistry::new());
        let collector = Arc::new(Collector::new(registry.clone()));
        let reporter = Arc::new(RecordingReporter::default());
        collector.add_reporter(reporter.clone());
        Self {
            registry,
            collector,
            reporter,
        }
    }
}

#[test]
fn test_end_to_end_counter_deltas() {
    let ctx = TestContext::new();

    ctx.collector.collect();
    for _ in 0..3 {
        ctx.registry.incr_one("req").unwrap();
    }
    let second = ctx.collector.collect();
    let third = ctx.collector.collect();

    assert_eq!(second.counters()["req"], 3);
    assert_eq!(third.counters()["req"], 0);

    let seen = ctx.reporter.snapshots();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[1], *second);
}

#[test]
fn test_full_summary_stays_cumulative() {
    let ctx = TestContext::new();

    ctx.registry.incr("req", 2).unwrap();
    ctx.registry.add("latency_ms", 120).unwrap();
    ctx.collector.collect();
    ctx.registry.incr("req", 5).unwrap();
    ctx.registry.add("latency_ms", 80).unwrap();
    let tick = ctx.collector.collect();

    assert_eq!(tick.counters()["req"], 5);
    assert_eq!(tick.metrics()["latency_ms"].count(), 1);

    let full = ctx.collector.full_summary();
    assert_eq!(full.counters()["req"], 7);
    assert_eq!(full.metrics()["latency_ms"].count(), 2);
    assert_eq!(full.metrics()["latency_ms"].sum(), 200);
}

#[test]
fn test_timer_feeds_collector() {
    let ctx = TestContext::new();

    let timer = tallyho_core::timer(&ctx.registry, "render page");
    timer.start();
    timer.stop_and_start("template");
    timer.stop();

    let tick = ctx.collector.collect();
    assert_eq!(tick.metrics()["render_page-template.millis"].count(), 1);
    assert_eq!(tick.metrics()["render_page.millis"].count(), 1);
}

#[test]
fn test_pushed_distributions_are_delta_tracked() {
    let ctx = TestContext::new();

    ctx.registry
        .add_distribution("batch", Histogram::from_values([1, 2, 3]).into())
        .unwrap();
    let first = ctx.collector.collect();
    ctx.registry
        .add_distribution("batch", Histogram::from_values([4]).into())
        .unwrap();
    let second = ctx.collector.collect();

    assert_eq!(first.metrics()["batch"].count(), 3);
    assert_eq!(second.metrics()["batch"].count(), 1);
    assert_eq!(second.metrics()["batch"].sum(), 4);
}

#[test]
fn test_filtering_reporter_in_pipeline() {
    let ctx = TestContext::new();
    let filtered = Arc::new(RecordingReporter::default());
    ctx.collector.add_reporter(Arc::new(FilteringReporter::exclude(
        filtered.clone(),
        vec![NamePattern::new("internal\\..*").unwrap()],
    )));

    ctx.registry.incr("internal.retries", 1).unwrap();
    ctx.registry.incr("api.calls", 1).unwrap();
    ctx.collector.collect();

    let unfiltered = ctx.reporter.snapshots().remove(0);
    let narrowed = filtered.snapshots().remove(0);
    assert_eq!(unfiltered.counters().len(), 2);
    assert_eq!(narrowed.counters().len(), 1);
    assert!(narrowed.counters().contains_key("api.calls"));
}

#[test]
fn test_async_registry_pipeline() {
    let inner = Arc::new(MetricsRegistry::new());
    let registry = Arc::new(AsyncRegistry::new(inner).unwrap());
    let collector = Collector::new(registry.clone());

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                for i in 0..100 {
                    registry.incr_one("events").unwrap();
                    registry.add("size", i).unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    registry.flush().unwrap();

    let tick = collector.collect();
    assert_eq!(tick.counters()["events"], 400);
    assert_eq!(tick.metrics()["size"].count(), 400);

    registry.shutdown();
    assert!(registry.incr_one("events").is_err());
}

#[tokio::test]
async fn test_scheduler_drives_reporters() {
    let ctx = TestContext::new();
    let scheduler = CollectionScheduler::current().unwrap();

    ctx.registry.incr("req", 1).unwrap();
    scheduler
        .schedule(Arc::clone(&ctx.collector), Duration::from_millis(10))
        .unwrap();

    for _ in 0..200 {
        if ctx.reporter.snapshots().len() >= 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    scheduler.stop();

    let seen = ctx.reporter.snapshots();
    assert!(seen.len() >= 3);
    let total: i64 = seen
        .iter()
        .map(|snapshot| snapshot.counters().get("req").copied().unwrap_or(0))
        .sum();
    assert_eq!(total, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scheduler_stop_halts_ticks() {
    let ctx = TestContext::new();
    let scheduler = CollectionScheduler::current().unwrap();
    scheduler
        .schedule(Arc::clone(&ctx.collector), Duration::from_millis(5))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    scheduler.stop();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let after_stop = ctx.reporter.snapshots().len();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(ctx.reporter.snapshots().len(), after_stop);
    assert_eq!(scheduler.active(), 0);
}
