//! Priority lists submitted against draw procedures

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;
use uuid::Uuid;

use super::error::{CampaignError, CampaignResult};
use super::ids::{EventId, ParticipantId, PriorityListId, ProcedureId};

/// One ranked wish inside a priority list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorityListItem {
    pub id: Uuid,
    pub event_id: EventId,
    /// 1-based rank, lower is preferred
    pub priority: u32,
}

/// A participant's ranked wish list for one draw procedure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriorityList {
    pub id: PriorityListId,
    pub procedure_id: ProcedureId,
    pub initiator: ParticipantId,
    pub participant: ParticipantId,
    pub created_at: DateTime<Utc>,
    items: Vec<PriorityListItem>,
}

impl PriorityList {
    /// Create an empty, transient list
    pub fn new(
        procedure_id: ProcedureId,
        participant: ParticipantId,
        initiator: ParticipantId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PriorityListId::TRANSIENT,
            procedure_id,
            initiator,
            participant,
            created_at,
            items: Vec::new(),
        }
    }

    /// Add a target with its rank. Items stay ordered by rank; equal ranks
    /// keep insertion order.
    pub fn add_item(&mut self, event_id: EventId, priority: u32) -> CampaignResult<&PriorityListItem> {
        if !event_id.is_persisted() {
            return Err(CampaignError::invalid_argument(
                "event_id",
                "target event is required",
            ));
        }
        if priority == 0 {
            return Err(CampaignError::invalid_argument(
                "priority",
                "must be a positive rank",
            ));
        }

        let position = self.items.partition_point(|item| item.priority <= priority);
        self.items.insert(
            position,
            PriorityListItem {
                id: Uuid::new_v4(),
                event_id,
                priority,
            },
        );
        Ok(&self.items[position])
    }

    /// Builder-style helper: add targets ranked 1..=n in the given order
    pub fn with_targets(mut self, targets: impl IntoIterator<Item = EventId>) -> CampaignResult<Self> {
        for (rank, event_id) in targets.into_iter().enumerate() {
            let priority = u32::try_from(rank + 1)
                .map_err(|_| CampaignError::invalid_argument("priority", "too many items"))?;
            self.add_item(event_id, priority)?;
        }
        Ok(self)
    }

    pub fn items(&self) -> &[PriorityListItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Target events in rank order
    pub fn event_ids(&self) -> impl Iterator<Item = EventId> + '_ {
        self.items.iter().map(|item| item.event_id)
    }
}

// ============================================================================
// Submission Quota
// ============================================================================

/// A submission that would break a draw procedure's list limits
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuotaViolation {
    #[error("Priority list quota exceeded: {existing} existing + {submitted} submitted > {max}")]
    TooManyLists {
        existing: usize,
        submitted: usize,
        max: u32,
    },

    #[error("Priority list has {items} items, at most {max} allowed")]
    TooManyItems { items: usize, max: u32 },

    #[error("Event {event} appears in more than one priority list")]
    DuplicateTarget { event: EventId },
}

/// Per-participant limits of one draw procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuota {
    pub max_lists: u32,
    pub max_items: u32,
}

impl ListQuota {
    /// Validate `submitted` against the lists the same participant already holds.
    ///
    /// Checks run in order: list count, list length, then targets repeated
    /// anywhere in the submission or already present in an existing list.
    pub fn check(
        &self,
        existing: &[PriorityList],
        submitted: &[PriorityList],
    ) -> Result<(), QuotaViolation> {
        if existing.len() + submitted.len() > self.max_lists as usize {
            return Err(QuotaViolation::TooManyLists {
                existing: existing.len(),
                submitted: submitted.len(),
                max: self.max_lists,
            });
        }

        let longest = existing
            .iter()
            .chain(submitted)
            .map(PriorityList::len)
            .max()
            .unwrap_or(0);
        if longest > self.max_items as usize {
            return Err(QuotaViolation::TooManyItems {
                items: longest,
                max: self.max_items,
            });
        }

        let mut seen: BTreeSet<EventId> =
            existing.iter().flat_map(PriorityList::event_ids).collect();
        for event in submitted.iter().flat_map(PriorityList::event_ids) {
            if !seen.insert(event) {
                return Err(QuotaViolation::DuplicateTarget { event });
            }
        }
        Ok(())
    }
}
