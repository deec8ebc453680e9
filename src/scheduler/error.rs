//! Error types for the scheduler module

use thiserror::Error;

use crate::store::StoreError;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// Required input missing or out of range
    #[error("Invalid argument '{field}': {reason}")]
    InvalidArgument { field: String, reason: String },

    /// Operation not allowed in the current timer state
    #[error("Illegal state: {reason}")]
    IllegalState { reason: String },

    /// Lookup found nothing
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// A lifecycle callback reported a failure
    #[error("Lifecycle callback '{hook}' failed for procedure {procedure}: {reason}")]
    CallbackFailed {
        procedure: String,
        hook: String,
        reason: String,
    },

    /// Collaborator failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SchedulerError {
    /// Create an invalid argument error
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an illegal state error
    pub fn illegal_state(reason: impl Into<String>) -> Self {
        Self::IllegalState {
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a callback failure
    pub fn callback(
        procedure: impl Into<String>,
        hook: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::CallbackFailed {
            procedure: procedure.into(),
            hook: hook.into(),
            reason: reason.into(),
        }
    }

    /// Check if the error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::CallbackFailed { .. } => true,
            Self::Store(e) => e.is_recoverable(),
            Self::InvalidArgument { .. } | Self::IllegalState { .. } | Self::NotFound { .. } => {
                false
            }
        }
    }
}
