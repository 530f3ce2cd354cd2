//! Reconciliation errors.

use fleet_model::ModelError;
use thiserror::Error;

/// Result type for engine operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Reconciliation errors.
///
/// Components return these unmodified; only the orchestrator decides between
/// requeue and terminal reporting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    /// Parent or referenced child vanished mid-pass.
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency clash, or a name already taken.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The declared spec is invalid or incomplete.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ReconcileError {
    /// Returns true if another pass after a backoff can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::StoreUnavailable(_))
    }

    /// Returns true if the pass should end quietly.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<ModelError> for ReconcileError {
    fn from(err: ModelError) -> Self {
        if err.is_ownership_error() {
            // Another controller owns the object; retrying will not help.
            ReconcileError::Configuration(err.to_string())
        } else {
            ReconcileError::Internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ReconcileError::Conflict("x".into()).is_transient());
        assert!(ReconcileError::StoreUnavailable("x".into()).is_transient());
        assert!(!ReconcileError::Configuration("x".into()).is_transient());
        assert!(!ReconcileError::NotFound("x".into()).is_transient());
        assert!(ReconcileError::NotFound("x".into()).is_benign());
    }

    #[test]
    fn test_ownership_error_is_configuration() {
        let err: ReconcileError = ModelError::AlreadyOwned {
            name: "a".into(),
            owner: "fleet/b".into(),
        }
        .into();
        assert!(matches!(err, ReconcileError::Configuration(_)));

        let err: ReconcileError = ModelError::UnknownKind("beat".into()).into();
        assert!(matches!(err, ReconcileError::Internal(_)));
    }
}
