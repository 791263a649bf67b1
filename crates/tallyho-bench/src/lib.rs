//! Tallyho Benchmark Suite
//!
//! Criterion benchmarks for the tallyho hot paths.
//!
//! # Benchmark Categories
//!
//! - **Histogram**: Recording, percentile queries, merge and subtraction
//! - **Registry**: Counter and metric writes, direct and queued
//! - **Collector**: Delta collection over registries of varying size

pub mod fixtures;

pub use fixtures::{latency_values, populated_registry, touch_all, Scale};
