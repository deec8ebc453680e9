//! Campaign domain entities
//!
//! This module holds the persisted data model of the enrollment engine:
//!
//! - [`Campaign`] - owns a set of non-overlapping procedures and the target events
//! - [`Procedure`] - a named, time-bounded allocation window (FIFO or draw)
//! - [`DrawSettings`] - lottery parameters carried by draw procedures
//! - [`PriorityList`] - a participant's ranked wish list for a draw
//!
//! # Interval convention
//!
//! Procedure windows are closed intervals. [`Campaign::find_current_procedure`]
//! returns a procedure for every instant in `[start, end]`, and
//! [`Campaign::add_procedure`] rejects a procedure whose window intersects an
//! applied one, touching endpoints included.

pub mod entity;
pub mod error;
pub mod ids;
pub mod priority;
pub mod procedure;

pub use entity::Campaign;
pub use error::{CampaignError, CampaignResult};
pub use ids::{CampaignId, EventId, ParticipantId, PriorityListId, ProcedureId};
pub use priority::{ListQuota, PriorityList, PriorityListItem, QuotaViolation};
pub use procedure::{DrawSettings, Procedure, ProcedureKind, ProcedureType};
