//! Error types shared across the engine.

use thiserror::Error;

use crate::resource::ResourceKind;

/// No handler is registered for a resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported kind: {0}")]
pub struct UnsupportedKind(pub ResourceKind);

/// Errors a resource handler may return.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The current state cannot be determined right now. Never means "absent".
    #[error("conflict: {0}")]
    Conflict(String),

    /// The desired spec was rejected.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Any other handler failure.
    #[error("handler failed: {0}")]
    Failed(String),
}

impl HandlerError {
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict(reason.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(reason.into())
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}

/// Errors from the resource repository.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("internal: {0}")]
    Internal(String),
}

/// Errors from the check queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("check queue is closed")]
    Closed,

    #[error("check queue is full")]
    Full,
}

/// Errors surfaced to the caller of the persister.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    UnsupportedKind(#[from] UnsupportedKind),

    #[error("invalid resource {name}: {reason}")]
    Validation { name: String, reason: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("resource {name} is stored as {stored}, not {requested}")]
    KindMismatch {
        name: String,
        stored: ResourceKind,
        requested: ResourceKind,
    },

    #[error("handler error for {name}: {source}")]
    Handler {
        name: String,
        #[source]
        source: HandlerError,
    },
}

/// Errors from one actuation pass.
#[derive(Debug, Error)]
pub enum ActuationError {
    #[error(transparent)]
    UnsupportedKind(#[from] UnsupportedKind),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{operation} failed for {name}: {source}")]
    Handler {
        name: String,
        operation: &'static str,
        #[source]
        source: HandlerError,
    },

    #[error("{operation} timed out for {name}")]
    Timeout {
        name: String,
        operation: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_kind_display() {
        let err = UnsupportedKind(ResourceKind::new("v1", "cluster"));
        assert_eq!(err.to_string(), "unsupported kind: v1/cluster");

        let err = PersistError::from(err);
        assert!(err.to_string().contains("v1/cluster"));
    }

    #[test]
    fn test_actuation_error_display() {
        let err = ActuationError::Handler {
            name: "web-1".to_string(),
            operation: "update",
            source: HandlerError::failed("upstream returned 500"),
        };
        assert!(err.to_string().contains("update failed for web-1"));
        assert!(err.to_string().contains("upstream returned 500"));
    }
}
