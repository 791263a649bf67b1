//! Driver error types.

use thiserror::Error;

/// Driver errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Registry, collector or pattern error.
    #[error("core error: {0}")]
    Core(#[from] tallyho_core::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
