//! Waiting for the end of a driver run.

use std::time::Duration;

use crate::error::Error;

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The configured run time elapsed.
    Elapsed,
    /// Ctrl+C was received.
    Signal,
}

/// Block until `run_for` elapses or ctrl+c arrives. Without a run time only
/// the signal ends the run.
///
/// Failing to install the signal handler surfaces as [`Error::Io`].
pub async fn wait_for_shutdown(run_for: Option<Duration>) -> Result<ShutdownReason, Error> {
    match run_for {
        Some(run_for) => {
            tokio::select! {
                _ = tokio::time::sleep(run_for) => Ok(ShutdownReason::Elapsed),
                result = tokio::signal::ctrl_c() => {
                    result.map_err(Error::Io)?;
                    Ok(ShutdownReason::Signal)
                }
            }
        }
        None => {
            tokio::signal::ctrl_c().await.map_err(Error::Io)?;
            Ok(ShutdownReason::Signal)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_time_elapses() {
        let reason = wait_for_shutdown(Some(Duration::from_millis(5))).await.unwrap();
        assert_eq!(reason, ShutdownReason::Elapsed);
    }

    #[test]
    fn test_io_error_display() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "no signal handler"));
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.to_string(), "io error: no signal handler");
    }
}
