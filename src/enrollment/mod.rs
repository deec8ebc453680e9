//! Allocation entry points
//!
//! Request handlers call [`EnrollmentService`] instead of talking to the
//! logics directly. The service resolves the running logic through the
//! orchestrator, so a request against a procedure whose window is not open
//! fails with [`EnrollmentError::NoActiveLogic`].

pub mod error;

use std::sync::Arc;

use crate::campaign::{CampaignId, EventId, ParticipantId, PriorityList, ProcedureId};
use crate::metrics;
use crate::scheduler::{ProcedureLogic, ProcedureOrchestrator, RegistrationRequest, SchedulerError};
use crate::store::Registration;

pub use error::{EnrollmentError, EnrollmentResult};

/// FIFO registration and priority-list submission
#[derive(Debug, Clone)]
pub struct EnrollmentService {
    orchestrator: Arc<ProcedureOrchestrator>,
}

impl EnrollmentService {
    pub fn new(orchestrator: Arc<ProcedureOrchestrator>) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &Arc<ProcedureOrchestrator> {
        &self.orchestrator
    }

    /// Register through the active FIFO logic of a procedure
    pub async fn register(
        &self,
        procedure: ProcedureId,
        request: RegistrationRequest,
    ) -> EnrollmentResult<Registration> {
        let result = match self.logic_for_procedure(procedure).await {
            Ok(logic) => register_with(logic, request, format!("FIFO procedure {procedure}")).await,
            Err(e) => Err(e),
        };
        record_registration(&result, request.participant);
        result
    }

    /// Register through whatever FIFO procedure is active in a campaign
    pub async fn register_in_campaign(
        &self,
        campaign: CampaignId,
        request: RegistrationRequest,
    ) -> EnrollmentResult<Registration> {
        let result = match self.logic_for_campaign(campaign).await {
            Ok(logic) => register_with(logic, request, format!("FIFO in campaign {campaign}")).await,
            Err(e) => Err(e),
        };
        record_registration(&result, request.participant);
        result
    }

    /// Submit priority lists to the active draw procedure of a campaign
    pub async fn submit_priority_lists(
        &self,
        campaign: CampaignId,
        participant: ParticipantId,
        initiator: ParticipantId,
        targets: Vec<Vec<EventId>>,
    ) -> EnrollmentResult<Vec<PriorityList>> {
        let result = match self.logic_for_campaign(campaign).await {
            Ok(logic) => {
                let target = format!("draw in campaign {campaign}");
                submit_with(logic, participant, initiator, targets, target).await
            }
            Err(e) => Err(e),
        };
        record_submission(&result, participant);
        result
    }

    /// Submit priority lists to a specific draw procedure
    pub async fn submit_to_procedure(
        &self,
        procedure: ProcedureId,
        participant: ParticipantId,
        initiator: ParticipantId,
        targets: Vec<Vec<EventId>>,
    ) -> EnrollmentResult<Vec<PriorityList>> {
        let result = match self.logic_for_procedure(procedure).await {
            Ok(logic) => {
                let target = format!("draw procedure {procedure}");
                submit_with(logic, participant, initiator, targets, target).await
            }
            Err(e) => Err(e),
        };
        record_submission(&result, participant);
        result
    }

    async fn logic_for_procedure(
        &self,
        procedure: ProcedureId,
    ) -> EnrollmentResult<Arc<dyn ProcedureLogic>> {
        self.orchestrator
            .find_active_logic_by_procedure(procedure)
            .await
            .ok_or_else(|| EnrollmentError::no_active_logic(format!("procedure {procedure}")))
    }

    async fn logic_for_campaign(
        &self,
        campaign: CampaignId,
    ) -> EnrollmentResult<Arc<dyn ProcedureLogic>> {
        match self.orchestrator.find_active_logic_by_campaign(campaign).await {
            Ok(logic) => Ok(logic),
            Err(SchedulerError::NotFound { .. }) => Err(EnrollmentError::no_active_logic(format!(
                "campaign {campaign}"
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

async fn register_with(
    logic: Arc<dyn ProcedureLogic>,
    request: RegistrationRequest,
    target: String,
) -> EnrollmentResult<Registration> {
    let fifo = logic
        .as_fifo()
        .ok_or_else(|| EnrollmentError::no_active_logic(target))?;
    fifo.register(request).await
}

async fn submit_with(
    logic: Arc<dyn ProcedureLogic>,
    participant: ParticipantId,
    initiator: ParticipantId,
    targets: Vec<Vec<EventId>>,
    target: String,
) -> EnrollmentResult<Vec<PriorityList>> {
    let draw = logic
        .as_draw()
        .ok_or_else(|| EnrollmentError::no_active_logic(target))?;
    draw.submit_priority_lists(participant, initiator, targets)
        .await
}

fn record_registration(result: &EnrollmentResult<Registration>, participant: ParticipantId) {
    match result {
        Ok(_) => metrics::record_registration("confirmed"),
        Err(e) => {
            tracing::debug!(participant = %participant, error = %e, "Registration refused");
            metrics::record_registration(e.outcome());
        }
    }
}

fn record_submission(result: &EnrollmentResult<Vec<PriorityList>>, participant: ParticipantId) {
    match result {
        Ok(_) => metrics::record_submission("accepted"),
        Err(e) => {
            tracing::debug!(participant = %participant, error = %e, "Priority lists refused");
            metrics::record_submission(e.outcome());
        }
    }
}
