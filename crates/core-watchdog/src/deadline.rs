//! Deadline Watch: alert when a scoped operation outlives its time budget
//!
//! The owner of an operation arms a watch when the operation begins and
//! closes it when the operation ends. A background watcher waits on the
//! completion signal with a bounded wait; if the deadline passes first it
//! logs an alert and submits the optional fallback task.
//!
//! The owner is never blocked or notified: the watch only observes.
//!
//! # Design
//!
//! The completion signal is a single-slot `oneshot` channel. The owner holds
//! the sender, the watcher holds the receiver, so there is exactly one
//! writer and one reader and no lock ownership to get wrong. Dropping an
//! unclosed [`DeadlineGuard`] releases the signal as well, so an early return
//! or panic in the owner cannot leave the signal armed forever.
//!
//! When `close()` races with the deadline, the watcher decides: a signal
//! that is already sent when the watcher wakes counts as on time
//! (`tokio::time::timeout` polls the signal before the timer). A close that
//! lands after the watcher fired is ignored.
//!
//! # Example
//!
//! ```
//! use lifeline_core_watchdog::deadline::DeadlineWatch;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), lifeline_core_watchdog::WatchdogError> {
//! let guard = DeadlineWatch::new("ldap-search", Duration::from_secs(5))
//!     .with_message("directory search is hanging")
//!     .with_fallback(async { /* reset the connection */ })
//!     .arm()?;
//!
//! // ... protected operation ...
//!
//! let outcome = guard.close().await.expect("watcher task");
//! assert!(!outcome.is_timed_out());
//! # Ok(())
//! # }
//! ```

use crate::error::WatchdogError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What the watcher observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The owner closed the watch before the deadline
    Completed { elapsed: Duration },

    /// The deadline passed while the operation was still running
    TimedOut { deadline: Duration },
}

impl WatchOutcome {
    /// True if the watcher raised its alert
    pub fn is_timed_out(&self) -> bool {
        matches!(self, WatchOutcome::TimedOut { .. })
    }
}

/// Configuration of a single deadline watch, armed with [`DeadlineWatch::arm`].
pub struct DeadlineWatch {
    label: String,
    deadline: Duration,
    message: Option<String>,
    fallback: Option<BoxFuture<'static, ()>>,
}

impl fmt::Debug for DeadlineWatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadlineWatch")
            .field("label", &self.label)
            .field("deadline", &self.deadline)
            .field("message", &self.message)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

impl DeadlineWatch {
    /// Create a watch for the operation named `label`
    pub fn new(label: impl Into<String>, deadline: Duration) -> Self {
        Self {
            label: label.into(),
            deadline,
            message: None,
            fallback: None,
        }
    }

    /// Extra text included in the alert
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Task submitted to the runtime when the deadline is exceeded
    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.fallback = Some(fallback.boxed());
        self
    }

    /// Label of the watched operation
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Time budget of the watched operation
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Arm the completion signal and schedule the watcher.
    ///
    /// Fails fast on a zero deadline or when no tokio runtime is running.
    pub fn arm(self) -> Result<DeadlineGuard, WatchdogError> {
        WatchdogError::check_duration("deadline", self.deadline)?;
        let runtime =
            Handle::try_current().map_err(|_| WatchdogError::NoRuntime("deadline watcher"))?;

        let (tx, rx) = oneshot::channel();
        let label = self.label.clone();
        let armed_at = Instant::now();
        let watcher = runtime.spawn(self.observe(rx, armed_at));

        Ok(DeadlineGuard {
            label,
            signal: CompletionSignal(Some(tx)),
            watcher,
        })
    }

    /// Run `operation` under this watch and return its output.
    ///
    /// The watch is closed as soon as the operation finishes; the caller is
    /// not told whether the deadline fired.
    pub async fn guard<F>(self, operation: F) -> Result<F::Output, WatchdogError>
    where
        F: Future,
    {
        let guard = self.arm()?;
        let output = operation.await;
        drop(guard.close());
        Ok(output)
    }

    async fn observe(self, signal: oneshot::Receiver<()>, armed_at: Instant) -> WatchOutcome {
        // A dropped sender means the guard went away, which also ends the operation
        match tokio::time::timeout(self.deadline, signal).await {
            Ok(_) => {
                let elapsed = armed_at.elapsed();
                info!(
                    label = %self.label,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "{} finished on time",
                    self.label
                );
                WatchOutcome::Completed { elapsed }
            }
            Err(_) => {
                warn!(
                    label = %self.label,
                    deadline_ms = self.deadline.as_millis() as u64,
                    message = self.message.as_deref().unwrap_or(""),
                    "{} did not finish within {:?}",
                    self.label,
                    self.deadline
                );
                if let Some(fallback) = self.fallback {
                    tokio::spawn(fallback);
                }
                WatchOutcome::TimedOut {
                    deadline: self.deadline,
                }
            }
        }
    }
}

/// Arm a watch with no message and no fallback
pub fn watch(label: impl Into<String>, deadline: Duration) -> Result<DeadlineGuard, WatchdogError> {
    DeadlineWatch::new(label, deadline).arm()
}

/// Sender half of the completion signal, released at most once
struct CompletionSignal(Option<oneshot::Sender<()>>);

impl CompletionSignal {
    /// Returns false if the signal was already released or the watcher gave up
    fn release(&mut self) -> bool {
        match self.0.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }
}

impl Drop for CompletionSignal {
    fn drop(&mut self) {
        self.release();
    }
}

/// Owner side of an armed [`DeadlineWatch`].
///
/// Close it when the protected operation finishes. Dropping the guard has
/// the same effect as closing it.
pub struct DeadlineGuard {
    label: String,
    signal: CompletionSignal,
    watcher: JoinHandle<WatchOutcome>,
}

impl fmt::Debug for DeadlineGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeadlineGuard")
            .field("label", &self.label)
            .field("armed", &self.signal.0.is_some())
            .finish()
    }
}

impl DeadlineGuard {
    /// Label of the watched operation
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Disarm the watch.
    ///
    /// Returns the watcher task; awaiting it yields what the watcher saw.
    /// Dropping the handle detaches the watcher, which is fine.
    pub fn close(self) -> JoinHandle<WatchOutcome> {
        let DeadlineGuard {
            label,
            mut signal,
            watcher,
        } = self;
        if !signal.release() {
            debug!(label = %label, "{} closed after its deadline fired", label);
        }
        watcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    fn counting_fallback(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_before_deadline_does_not_alert() {
        let alerts = Arc::new(AtomicUsize::new(0));
        let guard = DeadlineWatch::new("fast-op", Duration::from_millis(50))
            .with_fallback(counting_fallback(&alerts))
            .arm()
            .unwrap();

        sleep(Duration::from_millis(10)).await;
        let outcome = guard.close().await.unwrap();

        match outcome {
            WatchOutcome::Completed { elapsed } => {
                assert!(elapsed >= Duration::from_millis(10));
                assert!(elapsed < Duration::from_millis(50));
            }
            other => panic!("expected Completed, got {:?}", other),
        }
        sleep(Duration::from_millis(100)).await;
        assert_eq!(alerts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_after_deadline_alerts_once() {
        let alerts = Arc::new(AtomicUsize::new(0));
        let guard = DeadlineWatch::new("slow-op", Duration::from_millis(50))
            .with_message("still running")
            .with_fallback(counting_fallback(&alerts))
            .arm()
            .unwrap();

        sleep(Duration::from_millis(200)).await;
        let outcome = guard.close().await.unwrap();

        assert!(outcome.is_timed_out());
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_alert_fires_at_deadline() {
        let start = Instant::now();
        let fired_at = Arc::new(std::sync::Mutex::new(None));
        let slot = fired_at.clone();

        let _guard = DeadlineWatch::new("never-closed", Duration::from_millis(50))
            .with_fallback(async move {
                *slot.lock().unwrap() = Some(start.elapsed());
            })
            .arm()
            .unwrap();

        sleep(Duration::from_millis(200)).await;
        let fired = fired_at.lock().unwrap().expect("fallback should have run");
        assert!(fired >= Duration::from_millis(50));
        assert!(fired < Duration::from_millis(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_counts_as_close() {
        let alerts = Arc::new(AtomicUsize::new(0));
        let guard = DeadlineWatch::new("early-return", Duration::from_millis(50))
            .with_fallback(counting_fallback(&alerts))
            .arm()
            .unwrap();

        sleep(Duration::from_millis(5)).await;
        drop(guard);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(alerts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_returns_output() {
        let value = DeadlineWatch::new("compute", Duration::from_secs(1))
            .guard(async {
                sleep(Duration::from_millis(20)).await;
                42
            })
            .await
            .unwrap();

        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_slow_operation_still_completes() {
        let alerts = Arc::new(AtomicUsize::new(0));
        let value = DeadlineWatch::new("slow-compute", Duration::from_millis(10))
            .with_fallback(counting_fallback(&alerts))
            .guard(async {
                sleep(Duration::from_millis(30)).await;
                "done"
            })
            .await
            .unwrap();

        // The watch alerts but never cancels the operation
        assert_eq!(value, "done");
        assert_eq!(alerts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_deadline_rejected() {
        let err = watch("instant", Duration::ZERO).unwrap_err();
        assert!(matches!(
            err,
            WatchdogError::InvalidDuration {
                what: "deadline",
                ..
            }
        ));
    }

    #[test]
    fn test_arm_outside_runtime() {
        let err = watch("no-runtime", Duration::from_secs(1)).unwrap_err();
        assert_eq!(err, WatchdogError::NoRuntime("deadline watcher"));
    }

    #[test]
    fn test_debug_hides_fallback_body() {
        let watch = DeadlineWatch::new("dbg", Duration::from_secs(1)).with_fallback(async {});
        let rendered = format!("{:?}", watch);
        assert!(rendered.contains("fallback: true"));
        assert_eq!(watch.label(), "dbg");
        assert_eq!(watch.deadline(), Duration::from_secs(1));
    }
}
