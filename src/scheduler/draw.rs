//! Priority-list lottery
//!
//! Until the draw time participants submit ranked wish lists. Every
//! submission is validated as a whole before anything is persisted:
//!
//! 1. existing lists + submitted lists must not exceed `max_priority_lists`
//! 2. no list, existing or new, may hold more than `max_priority_list_items`
//! 3. no target event may appear in two lists of the same participant
//!
//! On the first lifecycle callback at or after the draw time all lists are
//! handed to the [`DrawResolver`](crate::store::DrawResolver), once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};

use super::error::{SchedulerError, SchedulerResult};
use super::logic::{BoundProcedure, ProcedureLogic};
use crate::campaign::{
    CampaignId, DrawSettings, EventId, ListQuota, ParticipantId, PriorityList, Procedure,
    ProcedureId,
};
use crate::clock::SharedClock;
use crate::enrollment::{EnrollmentError, EnrollmentResult};
use crate::store::Stores;

/// Logic for an active draw procedure
pub struct DrawLogic {
    procedure: BoundProcedure,
    stores: Stores,
    clock: SharedClock,
    resolved: AtomicBool,
}

impl DrawLogic {
    pub fn new(procedure: Procedure, stores: Stores, clock: SharedClock) -> Self {
        Self {
            procedure: BoundProcedure::new(procedure),
            stores,
            clock,
            resolved: AtomicBool::new(false),
        }
    }

    /// Whether the lists were already handed to the resolver
    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::SeqCst)
    }

    /// Submit one or more priority lists for `participant`.
    ///
    /// Each inner vector is one list, ranked in order. The batch is
    /// accepted or rejected as a whole. The quota is checked here first and
    /// again by the store when the lists are committed, so concurrent
    /// submissions by the same participant cannot both exceed it.
    pub async fn submit_priority_lists(
        &self,
        participant: ParticipantId,
        initiator: ParticipantId,
        targets: Vec<Vec<EventId>>,
    ) -> EnrollmentResult<Vec<PriorityList>> {
        let now = self.clock.now();
        let admission = self.procedure.read(|p| Admission::of(p, now))?;
        let procedure_id = admission.procedure_id;

        if now >= admission.draw_time {
            return Err(EnrollmentError::DrawClosed {
                procedure: procedure_id,
            });
        }
        if !admission.open {
            return Err(EnrollmentError::WindowClosed {
                procedure: procedure_id,
            });
        }
        if targets.is_empty() {
            return Err(EnrollmentError::invalid_argument(
                "targets",
                "at least one priority list is required",
            ));
        }
        if targets.iter().any(Vec::is_empty) {
            return Err(EnrollmentError::invalid_argument(
                "targets",
                "priority lists must not be empty",
            ));
        }

        let lists = targets
            .into_iter()
            .map(|events| {
                PriorityList::new(procedure_id, participant, initiator, now).with_targets(events)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let existing = self
            .stores
            .priority_lists
            .find_lists(procedure_id, participant)
            .await?;
        admission.quota.check(&existing, &lists)?;

        let campaign_id = admission.campaign_id;
        let campaign = self
            .stores
            .campaigns
            .get_campaign_by_id(campaign_id)
            .await?
            .ok_or(EnrollmentError::UnknownCampaign {
                campaign: campaign_id,
            })?;

        for event in lists.iter().flat_map(PriorityList::event_ids) {
            if !campaign.has_event(event) {
                return Err(EnrollmentError::UnknownEvent {
                    campaign: campaign_id,
                    event,
                });
            }
            if admission.rule_based
                && !self
                    .stores
                    .rules
                    .is_registration_allowed(participant, &campaign, event)
                    .await?
            {
                return Err(EnrollmentError::RegistrationDenied { participant, event });
            }
        }

        let saved = self
            .stores
            .priority_lists
            .save_lists(admission.quota, lists)
            .await?;
        tracing::info!(
            procedure_id = %procedure_id,
            participant = %participant,
            lists = saved.len(),
            "Priority lists accepted"
        );
        Ok(saved)
    }

    /// Hand every submitted list to the resolver if the draw time has come
    async fn hand_over_if_due(&self) -> SchedulerResult<()> {
        if self.is_resolved() {
            return Ok(());
        }

        let due = self.procedure.read(|p| {
            p.draw_settings()
                .is_some_and(|settings| self.clock.now() >= settings.draw_time())
        });
        if !due {
            return Ok(());
        }

        let procedure = self.procedure.snapshot();
        let lists = self
            .stores
            .priority_lists
            .find_all_lists(procedure.id())
            .await?;
        let submitted = lists.len();
        let registrations = self.stores.resolver.resolve(&procedure, lists).await?;
        self.resolved.store(true, Ordering::SeqCst);

        tracing::info!(
            procedure_id = %procedure.id(),
            lists = submitted,
            registrations = registrations.len(),
            "Draw handed over to resolver"
        );
        Ok(())
    }
}

/// Procedure fields a submission is validated against
struct Admission {
    procedure_id: ProcedureId,
    campaign_id: CampaignId,
    open: bool,
    draw_time: DateTime<Utc>,
    quota: ListQuota,
    rule_based: bool,
}

impl Admission {
    fn of(procedure: &Procedure, now: DateTime<Utc>) -> EnrollmentResult<Self> {
        let settings = procedure.draw_settings().ok_or_else(|| {
            EnrollmentError::invalid_argument(
                "procedure",
                format!("procedure {} is not a draw", procedure.id()),
            )
        })?;
        Ok(Self {
            procedure_id: procedure.id(),
            campaign_id: procedure.campaign_id(),
            open: procedure.contains(now),
            draw_time: settings.draw_time(),
            quota: settings.quota(),
            rule_based: settings.is_rule_based(),
        })
    }
}

#[async_trait]
impl ProcedureLogic for DrawLogic {
    fn name(&self) -> &'static str {
        "draw"
    }

    fn procedure(&self) -> Procedure {
        self.procedure.snapshot()
    }

    fn procedure_id(&self) -> ProcedureId {
        self.procedure.read(Procedure::id)
    }

    fn campaign_id(&self) -> CampaignId {
        self.procedure.read(Procedure::campaign_id)
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.procedure.read(|p| p.is_expired_at(now))
    }

    fn rebind(&self, procedure: Procedure) {
        self.procedure.replace(procedure);
    }

    async fn before_active(&self) -> SchedulerResult<()> {
        self.procedure.read(|procedure| -> SchedulerResult<()> {
            let draw_time = procedure
                .draw_settings()
                .map(DrawSettings::draw_time)
                .ok_or_else(|| {
                    SchedulerError::callback(
                        procedure.id().to_string(),
                        "before_active",
                        "not a draw",
                    )
                })?;
            tracing::info!(
                procedure_id = %procedure.id(),
                name = %procedure.name(),
                %draw_time,
                "Draw submissions opened"
            );
            Ok(())
        })
    }

    async fn while_active(&self) -> SchedulerResult<()> {
        self.hand_over_if_due().await
    }

    async fn after_active(&self) -> SchedulerResult<()> {
        self.hand_over_if_due().await?;
        tracing::info!(procedure_id = %self.procedure_id(), "Draw procedure closed");
        Ok(())
    }

    fn as_draw(&self) -> Option<&DrawLogic> {
        Some(self)
    }
}
