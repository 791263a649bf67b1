//! Core error types.

use thiserror::Error;

/// Result alias for fallible registry and distribution operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core instrumentation errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Two distributions of different kinds were combined.
    #[error("distribution of kind `{found}` cannot be combined with a `{expected}` distribution")]
    IncompatibleDistribution {
        /// Kind of the receiving distribution.
        expected: &'static str,
        /// Kind of the offending operand.
        found: &'static str,
    },

    /// A negative observation was rejected by the metric's value policy.
    #[error("negative observation {value} rejected")]
    NegativeObservation {
        /// The rejected value.
        value: i64,
    },

    /// The async registry's consumer is no longer running.
    #[error("registry command queue is closed")]
    RegistryClosed,

    /// The async registry's consumer thread could not be started.
    #[error("failed to spawn registry consumer: {0}")]
    ConsumerSpawn(#[source] std::io::Error),

    /// A name pattern failed to compile.
    #[error("invalid name pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}
