//! Result values shared by registry operations.

use serde::{Deserialize, Serialize};

/// Whether a mutation changed anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    /// State was modified.
    Changed,
    /// The request was a no-op.
    Unchanged,
}

impl Change {
    /// `Changed` when `changed` is true.
    pub fn from_bool(changed: bool) -> Self {
        if changed {
            Self::Changed
        } else {
            Self::Unchanged
        }
    }

    /// Whether state was modified.
    pub fn is_changed(self) -> bool {
        matches!(self, Self::Changed)
    }
}

/// Whether a save creates a new record or edits an existing one.
///
/// Create rejects duplicates; Edit requires the record to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    /// Add a new record.
    Create,
    /// Replace an existing record.
    Edit,
}

/// A successful result plus warnings from remote calls that did not abort
/// the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome<T> {
    /// The operation's result.
    pub value: T,
    /// Non-fatal problems, e.g. a failed Directory push.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl<T> Outcome<T> {
    /// Result without warnings.
    pub fn ok(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    /// Attach a warning.
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Whether any warning was recorded.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Result of a delete that may have produced remote-sync warnings.
pub type DeleteOutcome = Outcome<Change>;
