/// Errors from typed storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The caller passed an argument the operation cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend factory failed for this entity type. Construction is not
    /// retried; every operation on the type reports the original failure.
    #[error("backend for {type_name} failed to initialize: {reason}")]
    BackendInit {
        type_name: &'static str,
        reason: String,
    },

    /// A backend reported a failure while serving an operation.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
