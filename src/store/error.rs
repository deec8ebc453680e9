//! Error types for the external store collaborators

use thiserror::Error;

use crate::campaign::{CampaignError, EventId, ParticipantId, QuotaViolation};

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by persistence collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Target event has no free seat left
    #[error("Event {event} is full")]
    EventFull { event: EventId },

    /// Participant already holds a registration for the event
    #[error("Participant {participant} is already registered for event {event}")]
    AlreadyRegistered {
        event: EventId,
        participant: ParticipantId,
    },

    /// Priority lists rejected at commit by the procedure's limits
    #[error(transparent)]
    Quota(#[from] QuotaViolation),

    /// Write rejected because the stored state changed underneath
    #[error("Store conflict: {reason}")]
    Conflict { reason: String },

    /// Backend unreachable or poisoned
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    /// Seed data could not be read or applied
    #[error("Invalid seed data: {reason}")]
    InvalidSeed { reason: String },

    /// Entity validation failed while applying a change
    #[error(transparent)]
    Entity(#[from] CampaignError),
}

impl StoreError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn invalid_seed(reason: impl Into<String>) -> Self {
        Self::InvalidSeed {
            reason: reason.into(),
        }
    }

    /// Whether retrying later may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Conflict { .. })
    }
}
