/*!
 * Logging and tracing initialization
 *
 * Lifeline is a library; the host decides whether to install a subscriber.
 * This helper installs the one the rest of the stack expects.
 */

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LifelineConfig;
use crate::error::{LifelineError, Result};

/// Build the filter: `RUST_LOG` wins, otherwise the configured level for
/// both lifeline crates.
pub fn env_filter(config: &LifelineConfig) -> Result<EnvFilter> {
    let level = config.log_level.to_tracing_level();
    EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(format!(
                "lifeline={},lifeline_core_watchdog={}",
                level, level
            ))
        })
        .map_err(|e| LifelineError::Logging(format!("Failed to create log filter: {}", e)))
}

/// Initialize structured logging based on configuration
pub fn init_logging(config: &LifelineConfig) -> Result<()> {
    let env_filter = env_filter(config)?;

    if config.log_json {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .json();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| LifelineError::Logging(e.to_string()))
    } else {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_file(false)
            .with_line_number(false)
            .with_span_events(FmtSpan::NONE)
            .compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| LifelineError::Logging(e.to_string()))
    }
}

/// Initialize logging with custom format for testing
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("lifeline=debug,lifeline_core_watchdog=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok(); // Ignore error if already initialized
    });
}
