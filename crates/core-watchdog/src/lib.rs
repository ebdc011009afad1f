//! Lifeline Core Watchdog: Pure-logic liveness primitives
//!
//! # Overview
//!
//! This crate provides the two timing primitives the Lifeline health system
//! is built on:
//!
//! - **Deadline Watch**: Alerts (and optionally runs a fallback) when a scoped
//!   operation is still running after its time budget
//! - **Idle Tracker / Idle Registry**: Fires a callback once per idle period
//!   when a named resource stops reporting activity
//!
//! # Key Principles
//!
//! This crate is **pure logic** with zero knowledge of:
//! - What the watched operations do (directory lookups, database calls)
//! - How alerts are delivered (mail, dashboards, paging)
//! - Where configuration comes from
//!
//! Neither primitive polls. The deadline watcher performs one bounded wait
//! on a completion signal; the idle loop sleeps exactly until the next
//! possible idle instant and re-reads the clock when it wakes.
//!
//! # Architecture
//!
//! ```text
//!  owner task                         watcher task
//! ┌──────────────────────┐          ┌──────────────────────────┐
//! │ DeadlineWatch::arm() │──spawn──>│ timeout(deadline, signal)│
//! │   ... operation ...  │          │   ok   -> "on time"      │
//! │ guard.close() ───────┼─signal──>│   late -> alert+fallback │
//! └──────────────────────┘          └──────────────────────────┘
//!
//!  callers                            one task per tracker
//! ┌──────────────────────┐          ┌──────────────────────────┐
//! │ tracker.update(tok)  │─────────>│ sleep(remaining_ttl)     │
//! └──────────────────────┘          │ overdue -> on_idle()     │
//! ┌──────────────────────┐          │           update(name)   │
//! │ registry.stop(name)  │──cancel─>│ cancelled -> exit        │
//! └──────────────────────┘          └──────────────────────────┘
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use lifeline_core_watchdog::{DeadlineWatch, WatchdogError};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), WatchdogError> {
//! let rows = DeadlineWatch::new("nightly-report", Duration::from_secs(30))
//!     .with_message("report query is slow")
//!     .guard(async {
//!         // Your potentially slow operation
//!         42
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod deadline;
pub mod error;
pub mod idle;

// Re-export main types for convenience
pub use deadline::{watch, DeadlineGuard, DeadlineWatch, WatchOutcome};
pub use error::WatchdogError;
pub use idle::{IdleListener, IdleRegistry, IdleTracker, Ttl};

/// Prelude module for convenient imports
///
/// # Example
/// ```
/// use lifeline_core_watchdog::prelude::*;
/// ```
pub mod prelude {
    pub use super::deadline::{DeadlineGuard, DeadlineWatch, WatchOutcome};
    pub use super::error::WatchdogError;
    pub use super::idle::{IdleListener, IdleRegistry, IdleTracker, Ttl};
}
