//! On-demand gauge readings.

/// A supplier of a floating-point reading, sampled whenever the registry's
/// gauges are read.
///
/// Implemented for any `Fn() -> f64` closure.
pub trait Gauge: Send + Sync {
    /// Take a reading.
    fn read(&self) -> f64;
}

impl<F> Gauge for F
where
    F: Fn() -> f64 + Send + Sync,
{
    fn read(&self) -> f64 {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_closure_gauge() {
        let gauge = || 1.5;
        assert_eq!(gauge.read(), 1.5);
    }

    #[test]
    fn test_gauge_reads_live_value() {
        let source = Arc::new(AtomicU64::new(3));
        let reader = Arc::clone(&source);
        let gauge: Arc<dyn Gauge> = Arc::new(move || reader.load(Ordering::Relaxed) as f64);

        assert_eq!(gauge.read(), 3.0);
        source.store(9, Ordering::Relaxed);
        assert_eq!(gauge.read(), 9.0);
    }
}
