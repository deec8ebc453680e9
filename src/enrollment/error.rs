//! Error types for allocation requests

use thiserror::Error;

use crate::campaign::{
    CampaignError, CampaignId, EventId, ParticipantId, ProcedureId, QuotaViolation,
};
use crate::scheduler::SchedulerError;
use crate::store::StoreError;

/// Result type for enrollment operations
pub type EnrollmentResult<T> = Result<T, EnrollmentError>;

/// Reasons a registration or priority-list submission is refused
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentError {
    /// No running logic of the required kind; the window is not open
    #[error("No matching active logic for {target}")]
    NoActiveLogic { target: String },

    #[error("Procedure {procedure} is not open at this time")]
    WindowClosed { procedure: ProcedureId },

    #[error("Draw procedure {procedure} no longer accepts priority lists")]
    DrawClosed { procedure: ProcedureId },

    #[error("Campaign {campaign} does not exist")]
    UnknownCampaign { campaign: CampaignId },

    #[error("Event {event} is not a target of campaign {campaign}")]
    UnknownEvent { campaign: CampaignId, event: EventId },

    #[error("Participant {participant} may not register for event {event}")]
    RegistrationDenied {
        participant: ParticipantId,
        event: EventId,
    },

    #[error("Event {event} is fully booked")]
    EventFull { event: EventId },

    #[error("Participant {participant} is already registered for event {event}")]
    AlreadyRegistered {
        event: EventId,
        participant: ParticipantId,
    },

    /// Existing plus submitted lists exceed the per-participant maximum
    #[error("Priority list quota exceeded: {existing} existing + {submitted} submitted > {max}")]
    QuotaExceeded {
        existing: usize,
        submitted: usize,
        max: u32,
    },

    #[error("Priority list has {items} items, at most {max} allowed")]
    TooManyItems { items: usize, max: u32 },

    /// The same event appears in more than one list of a participant
    #[error("Event {event} appears in more than one priority list")]
    DuplicateTarget { event: EventId },

    #[error("Invalid argument '{field}': {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error(transparent)]
    Entity(#[from] CampaignError),
}

impl From<StoreError> for EnrollmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EventFull { event } => Self::EventFull { event },
            StoreError::AlreadyRegistered { event, participant } => {
                Self::AlreadyRegistered { event, participant }
            }
            StoreError::Quota(violation) => violation.into(),
            StoreError::Entity(e) => Self::Entity(e),
            other => Self::Store(other),
        }
    }
}

impl From<QuotaViolation> for EnrollmentError {
    fn from(violation: QuotaViolation) -> Self {
        match violation {
            QuotaViolation::TooManyLists {
                existing,
                submitted,
                max,
            } => Self::QuotaExceeded {
                existing,
                submitted,
                max,
            },
            QuotaViolation::TooManyItems { items, max } => Self::TooManyItems { items, max },
            QuotaViolation::DuplicateTarget { event } => Self::DuplicateTarget { event },
        }
    }
}

impl EnrollmentError {
    /// Create an invalid argument error
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a "no active logic" error
    pub fn no_active_logic(target: impl Into<String>) -> Self {
        Self::NoActiveLogic {
            target: target.into(),
        }
    }

    /// Short label used for metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::NoActiveLogic { .. } => "no_active_logic",
            Self::WindowClosed { .. } => "window_closed",
            Self::DrawClosed { .. } => "draw_closed",
            Self::UnknownCampaign { .. } => "unknown_campaign",
            Self::UnknownEvent { .. } => "unknown_event",
            Self::RegistrationDenied { .. } => "denied",
            Self::EventFull { .. } => "event_full",
            Self::AlreadyRegistered { .. } => "already_registered",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::TooManyItems { .. } => "too_many_items",
            Self::DuplicateTarget { .. } => "duplicate_target",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::Scheduler(_) | Self::Store(_) | Self::Entity(_) => "error",
        }
    }

    /// Whether the caller may retry the same request later
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::NoActiveLogic { .. } | Self::WindowClosed { .. } => true,
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Store(e) => e.is_recoverable(),
            _ => false,
        }
    }
}
