//! Unified error handling for the enroll-orchestrator crate
//!
//! Each domain module owns its error enum. This module wraps all of them in
//! one [`Error`] so callers crossing module boundaries (the CLI, service
//! glue) can use a single type.
//!
//! # Architecture
//!
//! - [`EnrollErrorTrait`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use enroll_orchestrator::error::{EnrollErrorTrait, Error};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         println!("Retrying: {} ({})", err, err.category().as_str());
//!     } else {
//!         eprintln!("Fatal error: {}", err);
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::campaign::CampaignError;
pub use crate::enrollment::EnrollmentError;
pub use crate::scheduler::SchedulerError;
pub use crate::store::StoreError;

/// Common trait for all crate error types
pub trait EnrollErrorTrait: std::error::Error {
    /// Check if this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid input, rejected synchronously
    Validation,
    /// Overlapping procedures or duplicate registrations
    Conflict,
    /// Allocation refused by a business rule (quota, capacity, window)
    Rejected,
    /// Timer state and lookup errors
    Scheduler,
    /// Store and I/O errors
    Storage,
    /// Configuration errors
    Config,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Rejected => "rejected",
            Self::Scheduler => "scheduler",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Campaign and procedure validation errors
    #[error("Campaign error: {0}")]
    Campaign(#[from] CampaignError),

    /// Collaborator errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Timer and lookup errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Refused registrations and submissions
    #[error("Enrollment error: {0}")]
    Enrollment(#[from] EnrollmentError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

fn campaign_category(err: &CampaignError) -> ErrorCategory {
    if err.is_conflict() {
        ErrorCategory::Conflict
    } else {
        ErrorCategory::Validation
    }
}

impl EnrollErrorTrait for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Campaign(_) => false,
            Self::Store(e) => e.is_recoverable(),
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Enrollment(e) => e.is_recoverable(),
            Self::Io(_) => true, // I/O errors are often transient
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Campaign(e) => campaign_category(e),
            Self::Store(e) => match e {
                StoreError::EventFull { .. } => ErrorCategory::Rejected,
                StoreError::AlreadyRegistered { .. } | StoreError::Conflict { .. } => {
                    ErrorCategory::Conflict
                }
                StoreError::InvalidSeed { .. } => ErrorCategory::Config,
                StoreError::Entity(e) => campaign_category(e),
                StoreError::Unavailable { .. } => ErrorCategory::Storage,
            },
            Self::Scheduler(e) => match e {
                SchedulerError::InvalidArgument { .. } => ErrorCategory::Validation,
                SchedulerError::Store(_) => ErrorCategory::Storage,
                _ => ErrorCategory::Scheduler,
            },
            Self::Enrollment(e) => match e {
                EnrollmentError::InvalidArgument { .. } | EnrollmentError::UnknownEvent { .. } => {
                    ErrorCategory::Validation
                }
                EnrollmentError::AlreadyRegistered { .. } | EnrollmentError::DuplicateTarget { .. } => {
                    ErrorCategory::Conflict
                }
                EnrollmentError::Store(_) => ErrorCategory::Storage,
                EnrollmentError::Scheduler(_) => ErrorCategory::Scheduler,
                EnrollmentError::Entity(e) => campaign_category(e),
                _ => ErrorCategory::Rejected,
            },
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Validation,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
