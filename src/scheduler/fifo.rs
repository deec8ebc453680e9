//! First-come-first-served registration
//!
//! While a FIFO procedure is active every request is admitted immediately
//! if the event still has room and the rule checker agrees. Capacity is
//! enforced by [`RegistrationStore::try_register`], so concurrent requests
//! for the last seat are serialized by the store, not here.
//!
//! [`RegistrationStore::try_register`]: crate::store::RegistrationStore::try_register

use async_trait::async_trait;
use uuid::Uuid;

use super::error::SchedulerResult;
use super::logic::{BoundProcedure, ProcedureLogic};
use crate::campaign::{CampaignId, EventId, ParticipantId, Procedure, ProcedureId};
use crate::clock::SharedClock;
use crate::enrollment::{EnrollmentError, EnrollmentResult};
use crate::store::{Registration, Stores};

/// One registration attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationRequest {
    pub event_id: EventId,
    pub participant: ParticipantId,
    /// Who submits the request, usually the participant
    pub initiator: ParticipantId,
    pub exam_only: bool,
}

impl RegistrationRequest {
    /// Self-service request for a regular seat
    pub fn new(event_id: EventId, participant: ParticipantId) -> Self {
        Self {
            event_id,
            participant,
            initiator: participant,
            exam_only: false,
        }
    }

    pub fn on_behalf_of(mut self, initiator: ParticipantId) -> Self {
        self.initiator = initiator;
        self
    }

    pub fn exam_only(mut self, exam_only: bool) -> Self {
        self.exam_only = exam_only;
        self
    }
}

/// Logic for an active FIFO procedure
pub struct FifoLogic {
    procedure: BoundProcedure,
    stores: Stores,
    clock: SharedClock,
}

impl FifoLogic {
    pub fn new(procedure: Procedure, stores: Stores, clock: SharedClock) -> Self {
        Self {
            procedure: BoundProcedure::new(procedure),
            stores,
            clock,
        }
    }

    /// Admit one participant to one event
    pub async fn register(&self, request: RegistrationRequest) -> EnrollmentResult<Registration> {
        let procedure = self.procedure.snapshot();
        let now = self.clock.now();

        if !procedure.contains(now) {
            return Err(EnrollmentError::WindowClosed {
                procedure: procedure.id(),
            });
        }

        let campaign_id = procedure.campaign_id();
        let campaign = self
            .stores
            .campaigns
            .get_campaign_by_id(campaign_id)
            .await?
            .ok_or(EnrollmentError::UnknownCampaign {
                campaign: campaign_id,
            })?;

        if !campaign.has_event(request.event_id) {
            return Err(EnrollmentError::UnknownEvent {
                campaign: campaign_id,
                event: request.event_id,
            });
        }

        let allowed = self
            .stores
            .rules
            .is_registration_allowed(request.participant, &campaign, request.event_id)
            .await?;
        if !allowed {
            return Err(EnrollmentError::RegistrationDenied {
                participant: request.participant,
                event: request.event_id,
            });
        }

        let registration = self
            .stores
            .registrations
            .try_register(Registration {
                id: Uuid::new_v4(),
                procedure_id: procedure.id(),
                event_id: request.event_id,
                participant: request.participant,
                initiator: request.initiator,
                exam_only: request.exam_only,
                confirmed_at: now,
            })
            .await?;

        tracing::info!(
            procedure_id = %procedure.id(),
            event_id = %registration.event_id,
            participant = %registration.participant,
            "Registration confirmed"
        );
        Ok(registration)
    }
}

#[async_trait]
impl ProcedureLogic for FifoLogic {
    fn name(&self) -> &'static str {
        "fifo"
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

    fn rebind(&self, procedure: Procedure) {
        self.procedure.replace(procedure);
    }

    async fn before_active(&self) -> SchedulerResult<()> {
        let procedure = self.procedure.snapshot();
        tracing::info!(
            procedure_id = %procedure.id(),
            name = %procedure.name(),
            end = %procedure.end(),
            "FIFO registration opened"
        );
        Ok(())
    }

    async fn while_active(&self) -> SchedulerResult<()> {
        Ok(())
    }

    async fn after_active(&self) -> SchedulerResult<()> {
        tracing::info!(procedure_id = %self.procedure_id(), "FIFO registration closed");
        Ok(())
    }

    fn as_fifo(&self) -> Option<&FifoLogic> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{Campaign, CampaignId};
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, d, 0, 0, 0).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, FifoLogic) {
        let store = Arc::new(MemoryStore::new());
        let mut campaign = Campaign::new(CampaignId::TRANSIENT, "c", day(1), day(20))
            .unwrap()
            .with_events([EventId(100)]);
        campaign
            .add_procedure(Procedure::fifo("f", CampaignId::TRANSIENT, day(2), day(4)).unwrap())
            .unwrap();
        let campaign = store.insert_campaign(campaign).unwrap();

        let clock = Arc::new(ManualClock::new(day(3)));
        let logic = FifoLogic::new(
            campaign.procedures()[0].clone(),
            Stores::from_memory(store.clone()),
            clock.clone(),
        );
        (store, clock, logic)
    }

    #[tokio::test]
    async fn test_register_confirms_seat() {
        let (store, _, logic) = setup();
        let request = RegistrationRequest::new(EventId(100), ParticipantId(7)).exam_only(true);

        let registration = logic.register(request).await.unwrap();
        assert!(registration.exam_only);
        assert_eq!(registration.initiator, ParticipantId(7));
        assert_eq!(store.registrations().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_register_outside_window() {
        let (_, clock, logic) = setup();
        clock.advance(Duration::days(2));

        let err = logic
            .register(RegistrationRequest::new(EventId(100), ParticipantId(7)))
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollmentError::WindowClosed { .. }));
    }

    #[tokio::test]
    async fn test_register_unknown_event() {
        let (_, _, logic) = setup();
        let err = logic
            .register(RegistrationRequest::new(EventId(5), ParticipantId(7)))
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollmentError::UnknownEvent { .. }));
    }

    #[tokio::test]
    async fn test_register_denied_by_rules() {
        let (store, _, logic) = setup();
        store
            .deny_registration(ParticipantId(7), EventId(100))
            .unwrap();

        let err = logic
            .register(RegistrationRequest::new(EventId(100), ParticipantId(7)))
            .await
            .unwrap_err();
        assert!(matches!(err, EnrollmentError::RegistrationDenied { .. }));
        assert!(store.registrations().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_full_event() {
        let (store, _, logic) = setup();
        store.set_capacity(EventId(100), 1).unwrap();

        logic
            .register(RegistrationRequest::new(EventId(100), ParticipantId(1)))
            .await
            .unwrap();
        let err = logic
            .register(RegistrationRequest::new(EventId(100), ParticipantId(2)))
            .await
            .unwrap_err();
        assert_eq!(err, EnrollmentError::EventFull { event: EventId(100) });
    }
}
