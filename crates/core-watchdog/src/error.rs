//! Error types for watchdog primitives

use std::time::Duration;
use thiserror::Error;

/// Errors returned when a watchdog primitive is misconfigured or misused.
///
/// Deadline overruns and idle periods are never reported through this type;
/// they are observed by the background tasks and surfaced via logs,
/// fallbacks and listeners. Only programming errors reach the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatchdogError {
    /// A deadline or idle threshold of zero was supplied
    #[error("invalid duration for {what}: {duration:?} (must be greater than zero)")]
    InvalidDuration {
        what: &'static str,
        duration: Duration,
    },

    /// The tracker is already registered and running
    #[error("idle tracker '{0}' is already running")]
    AlreadyRunning(String),

    /// Called outside of a tokio runtime, so the background task cannot be spawned
    #[error("no tokio runtime available to spawn the {0} task")]
    NoRuntime(&'static str),
}

impl WatchdogError {
    /// Reject zero durations at registration time
    pub(crate) fn check_duration(what: &'static str, duration: Duration) -> Result<(), Self> {
        if duration.is_zero() {
            return Err(WatchdogError::InvalidDuration { what, duration });
        }
        Ok(())
    }
}
