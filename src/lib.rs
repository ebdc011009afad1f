/*!
 * Lifeline - liveness monitoring and deadline watchdogs for long-running services
 *
 * A small health system for a server process:
 * - Availability state (healthy / paused, derived available) with listeners
 * - Pluggable health inspectors returning lists of faults
 * - A single-flight re-inspection loop that recovers the service on its own
 * - Deadline watches that alert when an operation overruns its budget
 * - Idle trackers that fire once per idle period for named resources
 *
 * The timing primitives live in the `lifeline-core-watchdog` crate and are
 * re-exported as [`watchdog`].
 *
 * Version: 0.1.0
 */

pub mod availability;
pub mod config;
pub mod error;
pub mod fault;
pub mod inspection;
pub mod inspector;
pub mod listener;
pub mod logging;

pub use lifeline_core_watchdog as watchdog;

// Re-export commonly used types
pub use availability::{AvailabilitySnapshot, ServiceAvailability, STARTING_REASON};
pub use config::{InspectorFailurePolicy, LifelineConfig, LogLevel};
pub use error::{ErrorCategory, LifelineError, Result};
pub use fault::{format_report, Fault, INSPECTOR_FAILURE_CODE};
pub use inspection::{Inspection, InspectionScheduler, InspectionStats};
pub use inspector::{FnInspector, HealthInspector, InspectionError, InspectorKind, NoopInspector};
pub use listener::{
    AvailabilityListener, ChangeCause, InspectionFailure, LoggingListener, StatusChange,
};
pub use watchdog::{DeadlineGuard, DeadlineWatch, IdleRegistry, IdleTracker, WatchOutcome};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
