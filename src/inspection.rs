/*!
 * Inspection scheduler: the single-flight re-inspection loop
 *
 * When the service is reported unhealthy with an inspector attached, the
 * scheduler starts one background loop that pings the inspector at a fixed
 * interval until it comes back clean, then marks the service healthy.
 * Triggers that arrive while a loop is active are dropped, not queued.
 *
 * # Single-flight guard
 *
 * ```text
 *   trigger ──> guard.fetch_add(1) ──> value > 1 ? ──yes──> reject (counted)
 *                                          │
 *                                          no
 *                                          ▼
 *                                   spawn loop body
 *                                          │
 *                  guard += 1 ────────────>│
 *                                          ▼
 *                ┌──────── ping (under DeadlineWatch) ◄──────┐
 *                │ faults                                    │
 *                ▼                                           │
 *       notify listeners, sleep(interval) ───────────────────┘
 *                │ clean
 *                ▼
 *       guard = 0, set_health_status(true, report, None)
 * ```
 *
 * The guard is also reset if the loop is cancelled through `shutdown()` or
 * its task is torn down. There is no backoff and no circuit breaker: a
 * check that never clears keeps the loop retrying until shutdown or until
 * its `ServiceAvailability` is dropped. The loop only holds a weak handle to
 * the availability, and dropping the scheduler cancels it.
 */

use futures::FutureExt;
use lifeline_core_watchdog::DeadlineWatch;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::availability::ServiceAvailability;
use crate::config::{InspectorFailurePolicy, LogLevel};
use crate::fault::{format_report, Fault};
use crate::inspector::{HealthInspector, InspectionError};
use crate::listener::InspectionFailure;

/// An inspector together with the delay between its failed rounds
#[derive(Clone)]
pub struct Inspection {
    pub inspector: Arc<dyn HealthInspector>,
    pub interval: Duration,
}

impl Inspection {
    pub fn new(inspector: Arc<dyn HealthInspector>, interval: Duration) -> Self {
        Self {
            inspector,
            interval,
        }
    }
}

impl fmt::Debug for Inspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inspection")
            .field("inspector", &self.inspector.name())
            .field("interval", &self.interval)
            .finish()
    }
}

/// Counters exposed for monitoring and tests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InspectionStats {
    /// Loops started
    pub started: u64,
    /// Triggers dropped because a loop was already active
    pub rejected: u64,
    /// Inspector pings performed
    pub rounds: u64,
    /// Pings that reported at least one fault
    pub failed_rounds: u64,
}

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    rejected: AtomicU64,
    rounds: AtomicU64,
    failed_rounds: AtomicU64,
}

/// Starts at most one inspection loop at a time
pub struct InspectionScheduler {
    guard: Arc<AtomicUsize>,
    process_timeout: Duration,
    failure_policy: InspectorFailurePolicy,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
}

impl fmt::Debug for InspectionScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InspectionScheduler")
            .field("guard", &self.guard.load(Ordering::Acquire))
            .field("process_timeout", &self.process_timeout)
            .field("failure_policy", &self.failure_policy)
            .field("shut_down", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl InspectionScheduler {
    /// `process_timeout` bounds each ping with a deadline watch; it must be non-zero
    pub fn new(process_timeout: Duration, failure_policy: InspectorFailurePolicy) -> Self {
        Self {
            guard: Arc::new(AtomicUsize::new(0)),
            process_timeout,
            failure_policy,
            counters: Arc::new(Counters::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Start an inspection loop unless one is already active.
    ///
    /// Returns true if this call started the loop.
    pub fn trigger(&self, availability: &Arc<ServiceAvailability>, inspection: Inspection) -> bool {
        let name = inspection.inspector.name().to_string();

        if self.shutdown.is_cancelled() {
            debug!(inspector = %name, "Inspection scheduler is shut down; trigger ignored");
            return false;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                error!(
                    inspector = %name,
                    "No tokio runtime available; cannot start inspection loop"
                );
                return false;
            }
        };

        let claimed = self.guard.fetch_add(1, Ordering::AcqRel) + 1;
        if claimed > 1 {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(
                inspector = %name,
                guard = claimed,
                "Inspection loop already running; trigger ignored"
            );
            return false;
        }

        self.counters.started.fetch_add(1, Ordering::Relaxed);
        let task = InspectionLoop {
            guard: GuardReset::new(self.guard.clone()),
            counters: self.counters.clone(),
            shutdown: self.shutdown.clone(),
            process_timeout: self.process_timeout,
            failure_policy: self.failure_policy,
            availability: Arc::downgrade(availability),
            inspection,
        };
        runtime.spawn(task.run());
        true
    }

    /// True while a loop is active or starting
    pub fn is_running(&self) -> bool {
        self.guard.load(Ordering::Acquire) > 0
    }

    pub fn stats(&self) -> InspectionStats {
        InspectionStats {
            started: self.counters.started.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            rounds: self.counters.rounds.load(Ordering::Relaxed),
            failed_rounds: self.counters.failed_rounds.load(Ordering::Relaxed),
        }
    }

    /// Cancel the running loop (if any) and ignore all future triggers
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Shutting down inspection scheduler");
            self.shutdown.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for InspectionScheduler {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Reopens the single-flight gate exactly once
struct GuardReset {
    guard: Arc<AtomicUsize>,
    released: bool,
}

impl GuardReset {
    fn new(guard: Arc<AtomicUsize>) -> Self {
        Self {
            guard,
            released: false,
        }
    }

    fn enter(&self) {
        self.guard.fetch_add(1, Ordering::AcqRel);
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.guard.store(0, Ordering::Release);
        }
    }
}

impl Drop for GuardReset {
    fn drop(&mut self) {
        self.release();
    }
}

struct InspectionLoop {
    guard: GuardReset,
    counters: Arc<Counters>,
    shutdown: CancellationToken,
    process_timeout: Duration,
    failure_policy: InspectorFailurePolicy,
    availability: Weak<ServiceAvailability>,
    inspection: Inspection,
}

impl InspectionLoop {
    async fn run(mut self) {
        self.guard.enter();

        let name = self.inspection.inspector.name().to_string();
        let interval = self.inspection.interval;
        info!(
            inspector = %name,
            interval_ms = interval.as_millis() as u64,
            "Inspection loop started for {}",
            name
        );

        let mut retry_index = 0u64;
        loop {
            let faults = self.ping_once(&name).await;
            self.counters.rounds.fetch_add(1, Ordering::Relaxed);
            let report = format_report(&name, &faults);

            if faults.is_empty() {
                // Reopen the gate before committing so a failure reported
                // right after recovery can start a fresh loop
                self.guard.release();
                info!(
                    inspector = %name,
                    failed_rounds = retry_index,
                    "Inspection of {} passed; marking service healthy",
                    name
                );
                if let Some(availability) = self.availability() {
                    availability.set_health_status(true, report, None);
                }
                return;
            }

            retry_index += 1;
            self.counters.failed_rounds.fetch_add(1, Ordering::Relaxed);
            log_failed_round(
                self.inspection.inspector.log_level(),
                &name,
                retry_index,
                &report,
            );
            let Some(availability) = self.availability() else {
                info!(inspector = %name, "Service availability dropped; inspection loop for {} exits", name);
                return;
            };
            availability.notify_inspection_failed(&InspectionFailure {
                inspector: name.clone(),
                retry_index,
                report,
                faults,
                next_interval: interval,
            });
            // No strong handle across the sleep
            drop(availability);

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(inspector = %name, "Inspection loop for {} cancelled", name);
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    fn availability(&self) -> Option<Arc<ServiceAvailability>> {
        self.availability.upgrade()
    }

    /// One ping under a deadline watch, with errors and panics folded in
    /// according to the failure policy
    async fn ping_once(&self, name: &str) -> Vec<Fault> {
        let inspector = &self.inspection.inspector;
        let ping = || AssertUnwindSafe(inspector.ping()).catch_unwind();

        let watch = DeadlineWatch::new(format!("inspection:{}", name), self.process_timeout)
            .with_message(format!("{} ping is still running", name));
        let outcome = match watch.guard(ping()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(inspector = %name, error = %e, "Could not arm deadline watch; pinging unwatched");
                ping().await
            }
        };

        let result = outcome
            .unwrap_or_else(|panic| Err(InspectionError::Panicked(panic_message(panic.as_ref()))));

        match result {
            Ok(faults) => faults,
            Err(e) => match self.failure_policy {
                InspectorFailurePolicy::Optimistic => {
                    warn!(
                        inspector = %name,
                        error = %e,
                        "Inspector {} failed; counting the round as clean",
                        name
                    );
                    Vec::new()
                }
                InspectorFailurePolicy::AsFault => {
                    warn!(
                        inspector = %name,
                        error = %e,
                        "Inspector {} failed; recording a fault",
                        name
                    );
                    vec![e.into_fault(name)]
                }
            },
        }
    }
}

fn log_failed_round(level: LogLevel, inspector: &str, retry: u64, report: &str) {
    match level {
        LogLevel::Error => error!(inspector, retry, "Inspection failed: {}", report),
        LogLevel::Warn => warn!(inspector, retry, "Inspection failed: {}", report),
        LogLevel::Info => info!(inspector, retry, "Inspection failed: {}", report),
        LogLevel::Debug => debug!(inspector, retry, "Inspection failed: {}", report),
        LogLevel::Trace => trace!(inspector, retry, "Inspection failed: {}", report),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
