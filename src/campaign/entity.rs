//! Campaigns and their applied procedures

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;

use super::error::{CampaignError, CampaignResult};
use super::ids::{CampaignId, EventId};
use super::procedure::Procedure;

/// A container of non-overlapping procedures and the events they govern
#[derive(Debug, Clone, Serialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    /// Start of the window in which the campaign is visible at all
    pub start_show: DateTime<Utc>,
    /// End of the visibility window (exclusive)
    pub end_show: DateTime<Utc>,
    procedures: Vec<Procedure>,
    pub event_ids: BTreeSet<EventId>,
    pub study_course_ids: BTreeSet<i64>,
}

impl Campaign {
    /// Create an empty campaign
    pub fn new(
        id: CampaignId,
        name: impl Into<String>,
        start_show: DateTime<Utc>,
        end_show: DateTime<Utc>,
    ) -> CampaignResult<Self> {
        if start_show >= end_show {
            return Err(CampaignError::InvalidInterval {
                start: start_show,
                end: end_show,
            });
        }

        Ok(Self {
            id,
            name: name.into(),
            start_show,
            end_show,
            procedures: Vec::new(),
            event_ids: BTreeSet::new(),
            study_course_ids: BTreeSet::new(),
        })
    }

    /// Add target events
    pub fn with_events(mut self, events: impl IntoIterator<Item = EventId>) -> Self {
        self.event_ids.extend(events);
        self
    }

    /// Add eligible study courses
    pub fn with_study_courses(mut self, courses: impl IntoIterator<Item = i64>) -> Self {
        self.study_course_ids.extend(courses);
        self
    }

    /// Read-only view of the applied procedures
    pub fn procedures(&self) -> &[Procedure] {
        &self.procedures
    }

    /// Whether the campaign is visible at `instant`
    pub fn is_visible_at(&self, instant: DateTime<Utc>) -> bool {
        self.start_show <= instant && instant < self.end_show
    }

    /// Whether `event_id` is one of this campaign's targets
    pub fn has_event(&self, event_id: EventId) -> bool {
        self.event_ids.contains(&event_id)
    }

    /// Apply a procedure to this campaign.
    ///
    /// Adding a procedure that is already applied is a no-op. A procedure
    /// whose window intersects an applied one is rejected and the set stays
    /// unchanged. A transient campaign reference on the procedure is bound to
    /// this campaign; a reference to a different campaign is rejected.
    pub fn add_procedure(&mut self, mut procedure: Procedure) -> CampaignResult<()> {
        if self.procedures.contains(&procedure) {
            return Ok(());
        }

        if procedure.campaign_id().is_persisted() && procedure.campaign_id() != self.id {
            return Err(CampaignError::invalid_argument(
                "procedure",
                format!(
                    "procedure belongs to campaign {}, not {}",
                    procedure.campaign_id(),
                    self.id
                ),
            ));
        }

        if let Some(existing) = self.procedures.iter().find(|p| p.overlaps(&procedure)) {
            return Err(CampaignError::Overlap {
                name: procedure.name().to_string(),
                existing: existing.id(),
            });
        }

        procedure.bind_campaign(self.id);
        self.procedures.push(procedure);
        Ok(())
    }

    /// Apply several procedures, skipping the ones that fail.
    /// Returns the failures in input order.
    pub fn add_procedures(
        &mut self,
        procedures: impl IntoIterator<Item = Procedure>,
    ) -> Vec<CampaignError> {
        procedures
            .into_iter()
            .filter_map(|procedure| self.add_procedure(procedure).err())
            .collect()
    }

    /// Replace an applied procedure with an updated version of itself,
    /// re-checking the overlap rule against the remaining procedures
    pub fn update_procedure(&mut self, procedure: Procedure) -> CampaignResult<()> {
        let index = self.position_of(&procedure)?;

        if let Some(existing) = self
            .procedures
            .iter()
            .enumerate()
            .find(|(i, p)| *i != index && p.overlaps(&procedure))
            .map(|(_, p)| p)
        {
            return Err(CampaignError::Overlap {
                name: procedure.name().to_string(),
                existing: existing.id(),
            });
        }

        self.procedures[index] = procedure;
        Ok(())
    }

    /// Remove an applied procedure; fails if it is not applied
    pub fn remove_procedure(&mut self, procedure: &Procedure) -> CampaignResult<Procedure> {
        let index = self.position_of(procedure)?;
        Ok(self.procedures.remove(index))
    }

    /// The procedure whose window contains `instant`, if any
    pub fn find_current_procedure(&self, instant: DateTime<Utc>) -> Option<&Procedure> {
        self.procedures.iter().find(|p| p.contains(instant))
    }

    /// The procedure whose window contains the current wall-clock time
    pub fn find_current_procedure_now(&self) -> Option<&Procedure> {
        self.find_current_procedure(Utc::now())
    }

    fn position_of(&self, procedure: &Procedure) -> CampaignResult<usize> {
        self.procedures
            .iter()
            .position(|p| p == procedure)
            .ok_or_else(|| {
                CampaignError::invalid_argument(
                    "procedure",
                    format!("'{}' is not applied to campaign {}", procedure.name(), self.id),
                )
            })
    }
}
