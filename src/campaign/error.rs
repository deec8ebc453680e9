//! Error types for campaign and procedure entities

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::ids::ProcedureId;

/// Result type for entity operations
pub type CampaignResult<T> = Result<T, CampaignError>;

/// Errors raised while building or mutating campaigns, procedures and priority lists
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CampaignError {
    /// Interval with start not strictly before end
    #[error("Invalid interval: start {start} must be before end {end}")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Draw time outside the procedure window
    #[error("Draw time {draw_time} must lie within [{start}, {end}]")]
    InvalidDrawTime {
        draw_time: DateTime<Utc>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// New procedure intersects a procedure already applied to the campaign
    #[error("Procedure '{name}' overlaps procedure {existing} already applied to the campaign")]
    Overlap { name: String, existing: ProcedureId },

    /// Required input missing or out of range
    #[error("Invalid argument '{field}': {reason}")]
    InvalidArgument { field: String, reason: String },
}

impl CampaignError {
    /// Create an invalid argument error
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error is an overlap conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Overlap { .. })
    }
}
