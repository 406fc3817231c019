//! Per-phase outcome of a batch run

use crate::error::{ErrorClass, ErrorKind};
use std::path::PathBuf;

/// One failed unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    /// Group/patient or file the failure belongs to
    pub unit: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Files produced, entries skipped and units that failed during one phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub completed: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failures: Vec<UnitFailure>,
}

impl BatchReport {
    /// Create an empty report
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a unit that finished
    pub fn record_success(&mut self, path: PathBuf) {
        self.completed.push(path);
    }

    /// Record a unit that was left alone
    pub fn record_skip(&mut self, path: PathBuf) {
        self.skipped.push(path);
    }

    /// Record a failed unit with the kind of its error
    pub fn record_failure<E: ErrorClass + ?Sized>(&mut self, unit: impl Into<String>, err: &E) {
        self.failures.push(UnitFailure {
            unit: unit.into(),
            kind: err.kind(),
            message: err.to_string(),
        });
    }

    /// Append everything from `other`
    pub fn merge(&mut self, other: BatchReport) {
        self.completed.extend(other.completed);
        self.skipped.extend(other.skipped);
        self.failures.extend(other.failures);
    }

    /// Sorts every list so reports from parallel runs compare equal.
    pub fn normalize(&mut self) {
        self.completed.sort();
        self.skipped.sort();
        self.failures.sort_by(|a, b| a.unit.cmp(&b.unit));
    }

    /// True when nothing failed
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failures of `kind`
    pub fn failures_of(&self, kind: ErrorKind) -> usize {
        self.failures.iter().filter(|f| f.kind == kind).count()
    }
}
