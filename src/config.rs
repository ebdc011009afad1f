/*!
 * Configuration types for Lifeline
 *
 * The host process owns loading (files, environment, flags); this crate only
 * defines the shape, the defaults and the validation rules.
 */

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{LifelineError, Result};

/// Tuning for the health system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifelineConfig {
    /// Delay between failed inspection rounds, in seconds
    #[serde(default = "default_inspection_interval")]
    pub inspection_interval_secs: u64,

    /// Budget for a single inspector ping before an alert is raised, in milliseconds
    #[serde(default = "default_process_timeout")]
    pub process_timeout_ms: u64,

    /// Inactivity after which idle trackers fire, in milliseconds
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_ms: u64,

    /// How an inspector that errors or panics is interpreted
    #[serde(default)]
    pub inspector_failure_policy: InspectorFailurePolicy,

    /// Log level for diagnostic output
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines instead of the compact text format
    #[serde(default)]
    pub log_json: bool,
}

impl Default for LifelineConfig {
    fn default() -> Self {
        Self {
            inspection_interval_secs: default_inspection_interval(),
            process_timeout_ms: default_process_timeout(),
            idle_threshold_ms: default_idle_threshold(),
            inspector_failure_policy: InspectorFailurePolicy::default(),
            log_level: LogLevel::default(),
            log_json: false,
        }
    }
}

impl LifelineConfig {
    /// Validate the configuration
    ///
    /// Every duration must be non-zero: a zero interval would turn the
    /// inspection loop into a busy loop, and zero deadlines or thresholds
    /// would fire immediately.
    pub fn validate(&self) -> Result<()> {
        if self.inspection_interval_secs == 0 {
            return Err(LifelineError::Config(
                "inspection_interval_secs must be greater than 0".to_string(),
            ));
        }

        if self.process_timeout_ms == 0 {
            return Err(LifelineError::Config(
                "process_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.idle_threshold_ms == 0 {
            return Err(LifelineError::Config(
                "idle_threshold_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn inspection_interval(&self) -> Duration {
        Duration::from_secs(self.inspection_interval_secs)
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_millis(self.process_timeout_ms)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }
}

/// What an inspector `Err` (or panic) means for the retry decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InspectorFailurePolicy {
    /// Count the round as clean; the service is declared healthy
    #[default]
    Optimistic,

    /// Turn the error into a synthetic fault; the loop keeps retrying
    AsFault,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

// Default value functions for serde

fn default_inspection_interval() -> u64 {
    30
}

fn default_process_timeout() -> u64 {
    10_000 // 10 s
}

fn default_idle_threshold() -> u64 {
    5 * 60 * 1000 // 5 min
}
