//! Idle detection: fire a callback once per idle period of a named resource
//!
//! An [`IdleTracker`] is a last-activity clock for one resource (a
//! connection, a session, a consumer). Callers bump it with
//! [`IdleTracker::update`] whenever the resource does work.
//!
//! The [`IdleRegistry`] runs one lightweight task per started tracker. The
//! task sleeps exactly until the tracker would become idle, re-reads the
//! clock on wake-up and either sleeps again (activity happened meanwhile) or
//! invokes the listener and resets the clock. There is no polling interval.
//!
//! Listeners run on tokio's blocking pool, so a listener may do synchronous
//! work (send mail, write to a socket) without stalling a runtime worker.
//! The loop waits for the listener to return before resetting the clock.
//!
//! # Example
//!
//! ```
//! use lifeline_core_watchdog::idle::{IdleRegistry, IdleTracker};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), lifeline_core_watchdog::WatchdogError> {
//! let registry = IdleRegistry::new();
//! let tracker = Arc::new(IdleTracker::new("ldap-pool"));
//!
//! registry.start(
//!     tracker.clone(),
//!     |t: &IdleTracker| println!("{} went idle", t.name()),
//!     Duration::from_secs(300),
//! )?;
//!
//! tracker.update(Some("request-17"));
//! assert!(registry.is_running("ldap-pool"));
//!
//! registry.stop("ldap-pool");
//! # Ok(())
//! # }
//! ```

use crate::error::WatchdogError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Time left before a tracker counts as idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Not idle yet; becomes idle after this much more inactivity
    Remaining(Duration),

    /// Idle; the threshold was crossed this long ago
    Overdue(Duration),
}

impl Ttl {
    /// True once the threshold has been reached
    pub fn is_overdue(&self) -> bool {
        matches!(self, Ttl::Overdue(_))
    }
}

#[derive(Debug)]
struct Activity {
    last_timestamp: Instant,
    last_token: Option<String>,
}

/// Last-activity clock for a single named resource.
///
/// Thread-safe; `update` only takes a short uncontended lock.
#[derive(Debug)]
pub struct IdleTracker {
    name: String,
    activity: Mutex<Activity>,
}

impl IdleTracker {
    /// Create a tracker whose clock starts now
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            activity: Mutex::new(Activity {
                last_timestamp: Instant::now(),
                last_token: None,
            }),
        }
    }

    /// Name of the monitored resource
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record activity now, optionally tagged with a correlation token
    pub fn update(&self, token: Option<&str>) {
        let mut activity = self.activity();
        activity.last_timestamp = Instant::now();
        activity.last_token = token.map(str::to_string);
    }

    /// When activity was last recorded
    pub fn last_activity(&self) -> Instant {
        self.activity().last_timestamp
    }

    /// Correlation token of the last recorded activity
    pub fn last_token(&self) -> Option<String> {
        self.activity().last_token.clone()
    }

    /// Time since the last recorded activity
    pub fn idle_for(&self) -> Duration {
        self.last_activity().elapsed()
    }

    /// Time left before the tracker has been idle for `threshold`
    pub fn remaining_ttl(&self, threshold: Duration) -> Ttl {
        let idle = self.idle_for();
        if idle < threshold {
            Ttl::Remaining(threshold - idle)
        } else {
            Ttl::Overdue(idle - threshold)
        }
    }

    /// True if the tracker has been idle for strictly longer than `threshold`
    pub fn is_timed_out(&self, threshold: Duration) -> bool {
        self.idle_for() > threshold
    }

    fn activity(&self) -> MutexGuard<'_, Activity> {
        self.activity.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Callback invoked when a tracker goes idle.
///
/// Called from a blocking-pool thread; blocking inside `on_idle` delays only
/// the next idle check of this tracker.
pub trait IdleListener: Send + Sync + 'static {
    fn on_idle(&self, tracker: &IdleTracker);
}

impl<F> IdleListener for F
where
    F: Fn(&IdleTracker) + Send + Sync + 'static,
{
    fn on_idle(&self, tracker: &IdleTracker) {
        self(tracker)
    }
}

struct IdleEntry {
    tracker: Arc<IdleTracker>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Runs one idle-detection loop per started tracker.
///
/// Each loop owns its own cancellation token; stopping a tracker cancels the
/// token, which also wakes the loop if it is sleeping. Dropping the registry
/// stops every loop.
#[derive(Default)]
pub struct IdleRegistry {
    entries: Mutex<HashMap<String, IdleEntry>>,
}

impl IdleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Start monitoring `tracker`.
    ///
    /// The listener is called once right away from the tracker's task as an
    /// initialization call, then once per idle period of `threshold`.
    pub fn start<L>(
        &self,
        tracker: Arc<IdleTracker>,
        listener: L,
        threshold: Duration,
    ) -> Result<(), WatchdogError>
    where
        L: IdleListener,
    {
        WatchdogError::check_duration("idle threshold", threshold)?;
        let runtime = Handle::try_current().map_err(|_| WatchdogError::NoRuntime("idle tracker"))?;

        let mut entries = self.entries();
        if let Some(existing) = entries.get(tracker.name()) {
            if !existing.task.is_finished() {
                return Err(WatchdogError::AlreadyRunning(tracker.name().to_string()));
            }
        }

        let cancel = CancellationToken::new();
        let task = runtime.spawn(run_tracker(
            tracker.clone(),
            listener,
            threshold,
            cancel.clone(),
        ));

        info!(
            tracker = %tracker.name(),
            threshold_ms = threshold.as_millis() as u64,
            "Started idle tracker {}",
            tracker.name()
        );
        entries.insert(
            tracker.name().to_string(),
            IdleEntry {
                tracker,
                cancel,
                task,
            },
        );
        Ok(())
    }

    /// Stop monitoring the named tracker.
    ///
    /// Returns false if it was not registered. The loop exits at its next
    /// iteration boundary, or immediately if it is sleeping.
    pub fn stop(&self, name: &str) -> bool {
        match self.entries().remove(name) {
            Some(entry) => {
                entry.cancel.cancel();
                info!(tracker = %name, "Stopped idle tracker {}", name);
                true
            }
            None => false,
        }
    }

    /// Stop every tracker and clear the registry
    pub fn stop_all(&self) {
        let drained: Vec<_> = self.entries().drain().collect();
        for (_, entry) in &drained {
            entry.cancel.cancel();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "Stopped all idle trackers");
        }
    }

    /// True if the named tracker is registered and its loop is alive
    pub fn is_running(&self, name: &str) -> bool {
        self.entries()
            .get(name)
            .map(|entry| !entry.task.is_finished())
            .unwrap_or(false)
    }

    /// The registered tracker with this name
    pub fn tracker(&self, name: &str) -> Option<Arc<IdleTracker>> {
        self.entries().get(name).map(|entry| entry.tracker.clone())
    }

    /// Number of registered trackers
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, IdleEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for IdleRegistry {
    fn drop(&mut self) {
        self.stop_all();
    }
}

impl std::fmt::Debug for IdleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.entries().keys().cloned().collect();
        f.debug_struct("IdleRegistry")
            .field("trackers", &names)
            .finish()
    }
}

async fn run_tracker<L>(
    tracker: Arc<IdleTracker>,
    listener: L,
    threshold: Duration,
    cancel: CancellationToken,
) where
    L: IdleListener,
{
    let listener = Arc::new(listener);
    notify(&tracker, &listener).await;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        match tracker.remaining_ttl(threshold) {
            Ttl::Remaining(wait) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            Ttl::Overdue(by) => {
                debug!(
                    tracker = %tracker.name(),
                    overdue_ms = by.as_millis() as u64,
                    last_token = tracker.last_token().as_deref().unwrap_or(""),
                    "{} idle for {:?}",
                    tracker.name(),
                    threshold + by
                );
                notify(&tracker, &listener).await;
                tracker.update(Some(tracker.name()));
            }
        }
    }

    debug!(tracker = %tracker.name(), "Idle loop for {} exited", tracker.name());
}

/// A panicking listener must not take the loop down with it
async fn notify<L: IdleListener>(tracker: &Arc<IdleTracker>, listener: &Arc<L>) {
    let (idle, callback) = (tracker.clone(), listener.clone());
    let outcome = tokio::task::spawn_blocking(move || callback.on_idle(&idle)).await;

    match outcome {
        Ok(()) => {}
        Err(e) if e.is_panic() => error!(
            tracker = %tracker.name(),
            "Idle listener for {} panicked; monitoring continues",
            tracker.name()
        ),
        Err(e) => debug!(
            tracker = %tracker.name(),
            error = %e,
            "Idle listener for {} did not run",
            tracker.name()
        ),
    }
}
