/*!
 * Fault records returned by health inspectors
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Code used for faults synthesized from inspector errors
pub const INSPECTOR_FAILURE_CODE: i32 = -1;

/// One finding of a health check.
///
/// Pure data: an inspector returns an empty list when everything is fine and
/// one `Fault` per problem otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fault {
    /// Numeric error code, meaningful to the inspector that produced it
    pub code: i32,

    /// Short machine-friendly tag (e.g. "ldap", "disk")
    pub tag: Option<String>,

    /// Underlying cause, usually the text of a lower-level error
    pub cause: Option<String>,

    /// Human-readable description
    pub desc: String,
}

impl Fault {
    pub fn new(code: i32, desc: impl Into<String>) -> Self {
        Self {
            code,
            tag: None,
            cause: None,
            desc: desc.into(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.code)?;
        if let Some(tag) = &self.tag {
            write!(f, " {}:", tag)?;
        }
        write!(f, " {}", self.desc)?;
        if let Some(cause) = &self.cause {
            write!(f, " (cause: {})", cause)?;
        }
        Ok(())
    }
}

/// Render the outcome of one inspection round.
///
/// Used both for logs and for the reason recorded on the availability state.
pub fn format_report(inspector: &str, faults: &[Fault]) -> String {
    if faults.is_empty() {
        return format!("{}: all checks passed", inspector);
    }

    let mut report = format!("{}: {} check(s) failed", inspector, faults.len());
    for fault in faults {
        report.push_str("\n  - ");
        report.push_str(&fault.to_string());
    }
    report
}
