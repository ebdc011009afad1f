/*!
 * Health inspectors: pluggable checks run by the inspection loop
 *
 * An inspector answers one question ("is my dependency usable right now?")
 * with a list of faults. Concrete checks (directory reachability, database
 * reachability, disk space) are supplied by the host.
 */

use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

use crate::config::LogLevel;
use crate::fault::{Fault, INSPECTOR_FAILURE_CODE};

/// An inspector could not produce a verdict at all.
///
/// Distinct from a non-empty fault list, which is a verdict.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InspectionError {
    /// The inspected dependency could not be contacted
    #[error("{target} unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    /// The inspector gave up waiting on its own
    #[error("inspection timed out after {0:?}")]
    Timeout(Duration),

    /// The inspector panicked while pinging
    #[error("inspector panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Other(String),
}

impl InspectionError {
    /// Synthesize a fault so the failure keeps the inspection loop retrying
    pub fn into_fault(self, inspector: &str) -> Fault {
        Fault::new(INSPECTOR_FAILURE_CODE, format!("{} could not complete its check", inspector))
            .with_tag("inspector")
            .with_cause(self.to_string())
    }
}

/// How callers should react to a non-empty result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InspectorKind {
    /// Faults mean the service is unhealthy
    #[default]
    HealthCheck,

    /// Faults mean the service should be paused (administrative condition)
    PauseCheck,
}

impl fmt::Display for InspectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InspectorKind::HealthCheck => write!(f, "health-check"),
            InspectorKind::PauseCheck => write!(f, "pause-check"),
        }
    }
}

/// A pluggable health check
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use lifeline::{Fault, HealthInspector, InspectionError};
///
/// struct DiskSpace {
///     free_pct: f64,
/// }
///
/// #[async_trait]
/// impl HealthInspector for DiskSpace {
///     fn name(&self) -> &str {
///         "disk-space"
///     }
///
///     async fn ping(&self) -> Result<Vec<Fault>, InspectionError> {
///         if self.free_pct < 5.0 {
///             return Ok(vec![Fault::new(1, "less than 5% free").with_tag("disk")]);
///         }
///         Ok(Vec::new())
///     }
/// }
/// ```
#[async_trait]
pub trait HealthInspector: Send + Sync {
    /// Name used in logs, reports and listener notifications
    fn name(&self) -> &str;

    /// Run the check once. An empty list means healthy.
    async fn ping(&self) -> Result<Vec<Fault>, InspectionError> {
        Ok(Vec::new())
    }

    fn kind(&self) -> InspectorKind {
        InspectorKind::HealthCheck
    }

    /// Level at which failed rounds of this inspector are logged
    fn log_level(&self) -> LogLevel {
        LogLevel::Warn
    }

    /// Identity used to correlate this inspector with an external
    /// pause/resume signal (e.g. a flag file)
    fn pause_lock_code(&self) -> String {
        self.name().to_string()
    }
}

/// Inspector that always reports healthy
#[derive(Debug, Clone)]
pub struct NoopInspector {
    name: String,
}

impl NoopInspector {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for NoopInspector {
    fn default() -> Self {
        Self::new("noop")
    }
}

#[async_trait]
impl HealthInspector for NoopInspector {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Adapts an async closure into an inspector
pub struct FnInspector<F> {
    name: String,
    kind: InspectorKind,
    probe: F,
}

impl<F, Fut> FnInspector<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Fault>, InspectionError>> + Send,
{
    pub fn new(name: impl Into<String>, probe: F) -> Self {
        Self {
            name: name.into(),
            kind: InspectorKind::HealthCheck,
            probe,
        }
    }

    pub fn with_kind(mut self, kind: InspectorKind) -> Self {
        self.kind = kind;
        self
    }
}

impl<F> fmt::Debug for FnInspector<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnInspector")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

#[async_trait]
impl<F, Fut> HealthInspector for FnInspector<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Fault>, InspectionError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn ping(&self) -> Result<Vec<Fault>, InspectionError> {
        (self.probe)().await
    }

    fn kind(&self) -> InspectorKind {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_inspector_defaults() {
        let inspector = NoopInspector::default();

        assert_eq!(inspector.name(), "noop");
        assert!(inspector.ping().await.unwrap().is_empty());
        assert_eq!(inspector.kind(), InspectorKind::HealthCheck);
        assert_eq!(inspector.log_level(), LogLevel::Warn);
        assert_eq!(inspector.pause_lock_code(), "noop");
    }

    #[tokio::test]
    async fn test_fn_inspector() {
        let inspector = FnInspector::new("ldap", || async {
            Ok(vec![Fault::new(81, "server down").with_tag("ldap")])
        })
        .with_kind(InspectorKind::PauseCheck);

        let faults = inspector.ping().await.unwrap();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].code, 81);
        assert_eq!(inspector.kind(), InspectorKind::PauseCheck);
        assert_eq!(inspector.pause_lock_code(), "ldap");
    }

    #[test]
    fn test_error_into_fault() {
        let fault = InspectionError::Unreachable {
            target: "db:5432".to_string(),
            reason: "connection refused".to_string(),
        }
        .into_fault("database");

        assert_eq!(fault.code, INSPECTOR_FAILURE_CODE);
        assert_eq!(fault.tag.as_deref(), Some("inspector"));
        assert_eq!(
            fault.cause.as_deref(),
            Some("db:5432 unreachable: connection refused")
        );
        assert_eq!(fault.desc, "database could not complete its check");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(InspectorKind::HealthCheck.to_string(), "health-check");
        assert_eq!(InspectorKind::PauseCheck.to_string(), "pause-check");
    }
}
