//! Tallyho driver library.
//!
//! Wires a registry, collector, scheduler and reporters together and runs
//! synthetic load through them.

pub mod config;
pub mod error;
pub mod load;
pub mod report;
pub mod shutdown;

pub use config::{Args, DriverConfig, OutputFormat, RegistryMode};
pub use error::Error;
pub use load::LoadGenerator;
pub use report::JsonReporter;
pub use shutdown::{wait_for_shutdown, ShutdownReason};
