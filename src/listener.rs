/*!
 * Listener callbacks: how the outside world learns about transitions
 *
 * The health system never sends mail, pages or dashboards itself. Alerting
 * code implements `AvailabilityListener` and registers it on the
 * `ServiceAvailability` instance.
 */

use std::time::Duration;
use tracing::{info, warn};

use crate::fault::Fault;

/// Which setter produced a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCause {
    Health,
    Pause,
}

/// A committed transition of the availability state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub cause: ChangeCause,
    pub healthy: bool,
    pub paused: bool,
    pub available: bool,
    /// True if the derived availability flipped with this change
    pub available_changed: bool,
    pub reason: String,
}

/// One failed round of the inspection loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectionFailure {
    pub inspector: String,
    /// 1 for the first failed round of a loop, 2 for the next, ...
    pub retry_index: u64,
    pub report: String,
    pub faults: Vec<Fault>,
    /// Delay before the next round
    pub next_interval: Duration,
}

/// Receives availability transitions and inspection failures.
///
/// Callbacks run on a thread that called a setter (or on the inspection
/// task) with no internal lock held, one change at a time and in commit
/// order. Keep them short and hand slow work to a task of your own.
pub trait AvailabilityListener: Send + Sync {
    /// Called when `healthy` or `paused` actually changed value
    fn on_availability_changed(&self, change: &StatusChange);

    /// Called after every failed inspection round
    fn on_inspection_failed(&self, _failure: &InspectionFailure) {}
}

impl<F> AvailabilityListener for F
where
    F: Fn(&StatusChange) + Send + Sync,
{
    fn on_availability_changed(&self, change: &StatusChange) {
        self(change)
    }
}

/// Listener that only writes transitions to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl AvailabilityListener for LoggingListener {
    fn on_availability_changed(&self, change: &StatusChange) {
        if change.available {
            info!(
                healthy = change.healthy,
                paused = change.paused,
                "Service available: {}",
                change.reason
            );
        } else {
            warn!(
                healthy = change.healthy,
                paused = change.paused,
                "Service unavailable: {}",
                change.reason
            );
        }
    }

    fn on_inspection_failed(&self, failure: &InspectionFailure) {
        warn!(
            inspector = %failure.inspector,
            retry = failure.retry_index,
            next_in_ms = failure.next_interval.as_millis() as u64,
            "Inspection round {} failed: {}",
            failure.retry_index,
            failure.report
        );
    }
}
