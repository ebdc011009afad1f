/*!
 * Service availability: the process-wide healthy/paused state
 *
 * `available` is derived (`healthy && !paused`) and recomputed under the
 * writer lock on every mutation, so a reader never sees it disagree with the
 * two flags it was derived from. Readers of the flags go through atomics and
 * never block.
 *
 * Listeners receive changes in commit order. Each committed change is
 * queued under the writer lock; whichever setter finds no dispatch in
 * progress drains the queue with no lock held, so a listener may itself call
 * the setters (its change is delivered after the current one). A setter can
 * therefore return before its own change has reached every listener when
 * another thread is dispatching.
 *
 * Reporting a failure with an attached `Inspection` starts the single-flight
 * re-inspection loop (see [`crate::inspection`]), which flips the service
 * back to healthy once the inspector comes back clean.
 */

use chrono::{DateTime, Utc};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use tracing::{error, info, warn};

use crate::config::LifelineConfig;
use crate::error::{LifelineError, Result};
use crate::inspection::{Inspection, InspectionScheduler};
use crate::listener::{AvailabilityListener, ChangeCause, InspectionFailure, StatusChange};

/// Reason recorded before the first status report
pub const STARTING_REASON: &str = "starting";

static GLOBAL: OnceLock<Arc<ServiceAvailability>> = OnceLock::new();

/// Point-in-time copy of the availability state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilitySnapshot {
    pub healthy: bool,
    pub paused: bool,
    pub available: bool,
    pub reason: String,
    /// When `healthy` or `paused` last changed value
    pub since: DateTime<Utc>,
}

pub struct ServiceAvailability {
    healthy: AtomicBool,
    paused: AtomicBool,
    available: AtomicBool,
    reason: RwLock<String>,
    /// Writer lock; also holds the time of the last transition
    writer: Mutex<DateTime<Utc>>,
    /// Committed changes not yet delivered, in commit order
    pending: Mutex<VecDeque<StatusChange>>,
    dispatching: AtomicBool,
    listeners: RwLock<Vec<Arc<dyn AvailabilityListener>>>,
    inspections: InspectionScheduler,
}

impl ServiceAvailability {
    /// Create an instance for injection. Starts unhealthy with reason "starting".
    pub fn new(config: &LifelineConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self::build(config)))
    }

    pub fn with_defaults() -> Arc<Self> {
        Arc::new(Self::build(&LifelineConfig::default()))
    }

    fn build(config: &LifelineConfig) -> Self {
        Self {
            healthy: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            available: AtomicBool::new(false),
            reason: RwLock::new(STARTING_REASON.to_string()),
            writer: Mutex::new(Utc::now()),
            pending: Mutex::new(VecDeque::new()),
            dispatching: AtomicBool::new(false),
            listeners: RwLock::new(Vec::new()),
            inspections: InspectionScheduler::new(
                config.process_timeout(),
                config.inspector_failure_policy,
            ),
        }
    }

    /// The process-wide instance, created with default settings on first use
    /// unless [`ServiceAvailability::install_global`] ran earlier.
    pub fn global() -> Arc<Self> {
        GLOBAL.get_or_init(Self::with_defaults).clone()
    }

    /// Make `instance` the process-wide one. Fails once `global()` has been used.
    pub fn install_global(instance: Arc<Self>) -> Result<()> {
        GLOBAL.set(instance).map_err(|_| {
            LifelineError::Config("global service availability already initialized".to_string())
        })
    }

    /// Record the health verdict.
    ///
    /// Returns true if `healthy` changed value. When the service is reported
    /// unhealthy with an inspection whose interval is non-zero, the
    /// re-inspection loop is started unless one is already running.
    pub fn set_health_status(
        self: &Arc<Self>,
        healthy: bool,
        reason: impl Into<String>,
        inspection: Option<Inspection>,
    ) -> bool {
        let reason = reason.into();
        let changed = {
            let mut since = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            let previous = self.healthy.swap(healthy, Ordering::AcqRel);
            self.commit(&mut since, ChangeCause::Health, previous != healthy, reason)
        };
        if changed {
            self.dispatch();
        }

        if !healthy {
            if let Some(inspection) = inspection.filter(|i| !i.interval.is_zero()) {
                self.inspections.trigger(self, inspection);
            }
        }

        changed
    }

    /// Record an administrative pause or resume. Returns true if `paused`
    /// changed value.
    pub fn set_pause_status(&self, paused: bool, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let changed = {
            let mut since = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            let previous = self.paused.swap(paused, Ordering::AcqRel);
            self.commit(&mut since, ChangeCause::Pause, previous != paused, reason)
        };
        if changed {
            self.dispatch();
        }
        changed
    }

    /// Recompute `available`, store the reason and queue the change if there
    /// is one; caller holds the writer lock
    fn commit(
        &self,
        since: &mut DateTime<Utc>,
        cause: ChangeCause,
        changed: bool,
        reason: String,
    ) -> bool {
        let healthy = self.healthy.load(Ordering::Acquire);
        let paused = self.paused.load(Ordering::Acquire);
        let available = healthy && !paused;
        let was_available = self.available.swap(available, Ordering::AcqRel);

        *self.reason.write().unwrap_or_else(PoisonError::into_inner) = reason.clone();
        if !changed {
            return false;
        }
        *since = Utc::now();

        self.pending_changes().push_back(StatusChange {
            cause,
            healthy,
            paused,
            available,
            available_changed: was_available != available,
            reason,
        });
        true
    }

    /// Deliver queued changes unless another caller is already doing so
    fn dispatch(&self) {
        loop {
            if self.dispatching.swap(true, Ordering::AcqRel) {
                return;
            }
            loop {
                // Pop in its own statement so the queue lock is not held below
                let next = self.pending_changes().pop_front();
                match next {
                    Some(change) => self.deliver(&change),
                    None => break,
                }
            }
            self.dispatching.store(false, Ordering::Release);

            // A change queued between the last pop and the store above has no
            // dispatcher yet
            if self.pending_changes().is_empty() {
                return;
            }
        }
    }

    fn deliver(&self, change: &StatusChange) {
        match (change.cause, change.healthy, change.paused) {
            (ChangeCause::Health, true, _) => {
                info!(available = change.available, "Service healthy: {}", change.reason)
            }
            (ChangeCause::Health, false, _) => {
                warn!(available = change.available, "Service unhealthy: {}", change.reason)
            }
            (ChangeCause::Pause, _, true) => {
                warn!(available = change.available, "Service paused: {}", change.reason)
            }
            (ChangeCause::Pause, _, false) => {
                info!(available = change.available, "Service resumed: {}", change.reason)
            }
        }
        self.notify_changed(change);
    }

    fn pending_changes(&self) -> MutexGuard<'_, VecDeque<StatusChange>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Reason given with the most recent status report
    pub fn reason(&self) -> String {
        self.reason
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Consistent copy of the whole state
    pub fn snapshot(&self) -> AvailabilitySnapshot {
        let since = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        AvailabilitySnapshot {
            healthy: self.is_healthy(),
            paused: self.is_paused(),
            available: self.is_available(),
            reason: self.reason(),
            since: *since,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn AvailabilityListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// The scheduler that owns the re-inspection loop
    pub fn inspections(&self) -> &InspectionScheduler {
        &self.inspections
    }

    pub(crate) fn notify_inspection_failed(&self, failure: &InspectionFailure) {
        for listener in self.current_listeners() {
            let outcome =
                catch_unwind(AssertUnwindSafe(|| listener.on_inspection_failed(failure)));
            if outcome.is_err() {
                error!(
                    inspector = %failure.inspector,
                    "Availability listener panicked while handling an inspection failure"
                );
            }
        }
    }

    fn notify_changed(&self, change: &StatusChange) {
        for listener in self.current_listeners() {
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.on_availability_changed(change)));
            if outcome.is_err() {
                error!(
                    cause = ?change.cause,
                    "Availability listener panicked while handling a status change"
                );
            }
        }
    }

    /// Listeners may register further listeners, so the list is copied out
    fn current_listeners(&self) -> Vec<Arc<dyn AvailabilityListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for ServiceAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAvailability")
            .field("healthy", &self.is_healthy())
            .field("paused", &self.is_paused())
            .field("available", &self.is_available())
            .field("reason", &self.reason())
            .field("listeners", &self.listener_count())
            .field("inspections", &self.inspections)
            .finish()
    }
}
