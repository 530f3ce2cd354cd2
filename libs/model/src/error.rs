//! Error types for the object model.

use thiserror::Error;

/// Errors raised while interpreting or wiring model objects.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A child kind string did not name a known kind.
    #[error("unknown child kind: '{0}'")]
    UnknownKind(String),

    /// An object kind string did not name a known kind.
    #[error("unknown object kind: '{0}'")]
    UnknownObjectKind(String),

    /// The object already has a different controlling owner.
    #[error("object '{name}' is already owned by {owner}")]
    AlreadyOwned { name: String, owner: String },

    /// The owner and the child live in different namespaces.
    #[error("cross-namespace owner: child in '{child}', owner in '{owner}'")]
    CrossNamespaceOwner { child: String, owner: String },
}

impl ModelError {
    /// Returns true if this error was raised by ownership wiring.
    pub fn is_ownership_error(&self) -> bool {
        matches!(
            self,
            ModelError::AlreadyOwned { .. } | ModelError::CrossNamespaceOwner { .. }
        )
    }
}
