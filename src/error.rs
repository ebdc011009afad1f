/*!
 * Error types for Lifeline
 */

use lifeline_core_watchdog::WatchdogError;
use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LifelineError>;

/// Errors surfaced to callers of the health system.
///
/// Failed health checks, overrun deadlines and idle periods are not errors:
/// they are absorbed by the monitoring loops and reported through logs and
/// listeners. What reaches the caller is misconfiguration.
#[derive(Debug, Error)]
pub enum LifelineError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Logging could not be initialized
    #[error("logging error: {0}")]
    Logging(String),

    /// A watchdog primitive rejected its arguments
    #[error(transparent)]
    Watchdog(#[from] WatchdogError),
}

impl LifelineError {
    /// Get error category for logging and instrumentation
    pub fn category(&self) -> ErrorCategory {
        match self {
            LifelineError::Config(_) => ErrorCategory::Configuration,
            LifelineError::Logging(_) => ErrorCategory::Logging,
            LifelineError::Watchdog(WatchdogError::NoRuntime(_)) => ErrorCategory::Runtime,
            LifelineError::Watchdog(_) => ErrorCategory::Validation,
        }
    }
}

/// Error category for classification and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Invalid configuration values
    Configuration,
    /// Subscriber installation errors
    Logging,
    /// Invalid arguments at registration time
    Validation,
    /// No async runtime to run background tasks on
    Runtime,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Logging => write!(f, "logging"),
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Runtime => write!(f, "runtime"),
        }
    }
}
