//! Run report
//!
//! Per-record semantic problems during tree walking, closure computation and
//! import writes never abort a run; they accumulate here so the operator
//! gets one complete report at the end. The run as a whole succeeds iff no
//! entry of error severity was recorded. Warnings (duplicate adds, hash
//! drift, scope skips) do not fail the run.

use crate::identifier::RecordId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a report entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Informational / self-healing condition; never fails the run
    Warning,
    /// Semantic failure; the run is reported failed
    Error,
}

/// One accumulated report entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Severity
    pub severity: Severity,
    /// Record the entry is about, when one applies
    pub record: Option<RecordId>,
    /// Human-readable description
    pub message: String,
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        match &self.record {
            Some(id) => write!(f, "[{tag}] {id}: {}", self.message),
            None => write!(f, "[{tag}] {}", self.message),
        }
    }
}

/// Accumulated errors and warnings of one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    entries: Vec<ReportEntry>,
}

impl RunReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error about a specific record
    pub fn error(&mut self, record: RecordId, message: impl Into<String>) {
        self.entries.push(ReportEntry {
            severity: Severity::Error,
            record: Some(record),
            message: message.into(),
        });
    }

    /// Record an error not tied to a record
    pub fn error_global(&mut self, message: impl Into<String>) {
        self.entries.push(ReportEntry {
            severity: Severity::Error,
            record: None,
            message: message.into(),
        });
    }

    /// Record a warning about a specific record
    pub fn warn(&mut self, record: RecordId, message: impl Into<String>) {
        self.entries.push(ReportEntry {
            severity: Severity::Warning,
            record: Some(record),
            message: message.into(),
        });
    }

    /// Record a warning not tied to a record
    pub fn warn_global(&mut self, message: impl Into<String>) {
        self.entries.push(ReportEntry {
            severity: Severity::Warning,
            record: None,
            message: message.into(),
        });
    }

    /// All entries in accumulation order
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    /// Entries of error severity
    pub fn errors(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries
            .iter()
            .filter(|e| e.severity == Severity::Error)
    }

    /// Entries of warning severity
    pub fn warnings(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries
            .iter()
            .filter(|e| e.severity == Severity::Warning)
    }

    /// True if no error-severity entry was recorded
    ///
    /// This is the run's overall success criterion.
    pub fn is_success(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Merge another report's entries into this one
    pub fn absorb(&mut self, other: RunReport) {
        self.entries.extend(other.entries);
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_success() {
        assert!(RunReport::new().is_success());
    }

    #[test]
    fn test_warnings_do_not_fail_the_run() {
        let mut report = RunReport::new();
        report.warn(RecordId::new("pages", 1), "already added");
        report.warn_global("stale hash corrected");
        assert!(report.is_success());
        assert_eq!(report.warnings().count(), 2);
        assert_eq!(report.errors().count(), 0);
    }

    #[test]
    fn test_any_error_fails_the_run() {
        let mut report = RunReport::new();
        report.warn_global("fine");
        report.error(RecordId::new("content", 7), "lost relation");
        assert!(!report.is_success());
        assert_eq!(report.errors().count(), 1);
    }

    #[test]
    fn test_absorb_preserves_order_and_severity() {
        let mut a = RunReport::new();
        a.warn_global("first");
        let mut b = RunReport::new();
        b.error_global("second");
        a.absorb(b);
        assert_eq!(a.entries().len(), 2);
        assert!(!a.is_success());
    }

    #[test]
    fn test_display_includes_record_and_tag() {
        let mut report = RunReport::new();
        report.error(RecordId::new("content", 3), "missing");
        let text = report.to_string();
        assert!(text.contains("[error]"));
        assert!(text.contains("content:3"));
    }
}
