//! Error taxonomy and the shared error/warning collection.
//!
//! Every stage of a reconciliation cycle (loader, remote mirror,
//! reconciliator) appends into one [`ErrorCollection`]. Errors abort the
//! cycle at the next checkpoint; warnings never do.

use serde::Serialize;
use std::sync::Mutex;
use thiserror::Error;

/// The severity of a recorded issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Recoverable; the cycle continues.
    Warning,
    /// Fatal for the cycle; no further mutations are dispatched.
    Error,
}

/// An issue raised while loading, fetching, planning or applying.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncError {
    /// A declared document was rejected.
    #[error("{path}: {reason}")]
    Validation {
        /// Path of the offending file, relative to the teams repo.
        path: String,
        /// Why the document was rejected.
        reason: String,
    },

    /// A recoverable issue in the declared model.
    #[error("{path}: {reason}")]
    ValidationWarning {
        /// Path of the offending file, relative to the teams repo.
        path: String,
        /// What is questionable about the document.
        reason: String,
    },

    /// A GitHub read failed.
    #[error("failed to fetch {asset}: {reason}")]
    Fetch {
        /// The asset class being fetched (users, teams, ...).
        asset: String,
        /// The underlying failure.
        reason: String,
    },

    /// A GitHub write failed. Non-fatal; the entity is re-diffed next cycle.
    #[error("mutation {command} failed: {reason}")]
    Mutation {
        /// The command that failed.
        command: String,
        /// The underlying failure.
        reason: String,
    },

    /// Change cap exceeded or a destructive operation was blocked.
    #[error("policy violation: {reason}")]
    Policy {
        /// What the policy gate rejected.
        reason: String,
    },

    /// The cycle was cancelled cooperatively.
    #[error("reconciliation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Creates a validation error.
    pub fn validation(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a validation warning.
    pub fn warning(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationWarning {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a fetch error.
    pub fn fetch(asset: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            asset: asset.into(),
            reason: reason.into(),
        }
    }

    /// Creates a mutation error.
    pub fn mutation(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Mutation {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Creates a policy error.
    pub fn policy(reason: impl Into<String>) -> Self {
        Self::Policy {
            reason: reason.into(),
        }
    }

    /// Returns the severity of this issue.
    pub fn severity(&self) -> Severity {
        match self {
            SyncError::ValidationWarning { .. } | SyncError::Mutation { .. } => Severity::Warning,
            SyncError::Validation { .. }
            | SyncError::Fetch { .. }
            | SyncError::Policy { .. }
            | SyncError::Cancelled => Severity::Error,
        }
    }
}

/// Append-only, thread-safe collection of errors and warnings.
///
/// Shared by reference between the loader, the mirror and the
/// reconciliator for the duration of a cycle.
#[derive(Debug, Default)]
pub struct ErrorCollection {
    errors: Mutex<Vec<SyncError>>,
    warnings: Mutex<Vec<SyncError>>,
}

impl ErrorCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a fatal error.
    pub fn add_error(&self, error: SyncError) {
        self.errors.lock().expect("error list poisoned").push(error);
    }

    /// Records a warning.
    pub fn add_warning(&self, warning: SyncError) {
        self.warnings
            .lock()
            .expect("warning list poisoned")
            .push(warning);
    }

    /// Records an issue in the channel matching its severity.
    pub fn add(&self, issue: SyncError) {
        match issue.severity() {
            Severity::Warning => self.add_warning(issue),
            Severity::Error => self.add_error(issue),
        }
    }

    /// Returns true if any fatal error has been recorded.
    pub fn has_errors(&self) -> bool {
        !self.errors.lock().expect("error list poisoned").is_empty()
    }

    /// Returns true if any warning has been recorded.
    pub fn has_warnings(&self) -> bool {
        !self
            .warnings
            .lock()
            .expect("warning list poisoned")
            .is_empty()
    }

    /// Returns a snapshot of the recorded errors.
    pub fn errors(&self) -> Vec<SyncError> {
        self.errors.lock().expect("error list poisoned").clone()
    }

    /// Returns a snapshot of the recorded warnings.
    pub fn warnings(&self) -> Vec<SyncError> {
        self.warnings.lock().expect("warning list poisoned").clone()
    }

    /// Returns the first recorded error, if any.
    pub fn first_error(&self) -> Option<SyncError> {
        self.errors
            .lock()
            .expect("error list poisoned")
            .first()
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_classification() {
        assert_eq!(
            SyncError::validation("users/org/a.yaml", "bad").severity(),
            Severity::Error
        );
        assert_eq!(
            SyncError::warning("teams/x/team.yaml", "one owner").severity(),
            Severity::Warning
        );
        assert_eq!(
            SyncError::mutation("createTeam", "503").severity(),
            Severity::Warning
        );
        assert_eq!(SyncError::Cancelled.severity(), Severity::Error);
    }

    #[test]
    fn collection_routes_by_severity() {
        let collection = ErrorCollection::new();
        collection.add(SyncError::warning("a", "w"));
        assert!(!collection.has_errors());
        assert!(collection.has_warnings());

        collection.add(SyncError::policy("too many changes"));
        assert!(collection.has_errors());
        assert_eq!(collection.errors().len(), 1);
        assert_eq!(collection.warnings().len(), 1);
    }

    #[test]
    fn first_error_is_stable() {
        let collection = ErrorCollection::new();
        collection.add_error(SyncError::validation("a", "first"));
        collection.add_error(SyncError::validation("b", "second"));
        assert_eq!(
            collection.first_error(),
            Some(SyncError::validation("a", "first"))
        );
    }

    #[test]
    fn error_display() {
        let err = SyncError::fetch("teams", "connection reset");
        assert!(err.to_string().contains("teams"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Warning < Severity::Error);
    }
}
