//! Collaborator contracts for persistence and eligibility
//!
//! The orchestration core never talks to a database directly. Everything it
//! needs from the outside world is expressed as a narrow trait here, so the
//! engine can run against a production backend or the in-memory
//! [`MemoryStore`] used by tests and the demo CLI.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          ProcedureOrchestrator / EnrollmentService          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Collaborator Traits                     │
//! │  CampaignStore, ProcedureStore, PriorityListStore,           │
//! │  RegistrationStore, RuleChecker, DrawResolver, TickScope     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  ┌───────────┴───────────┐
//!                  ▼                       ▼
//!         ┌─────────────────┐     ┌─────────────────┐
//!         │    Database     │     │   MemoryStore   │
//!         │     backend     │     │  (tests, demo)  │
//!         └─────────────────┘     └─────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod seed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::campaign::{
    Campaign, CampaignId, EventId, ListQuota, ParticipantId, PriorityList, Procedure,
    ProcedureId, ProcedureType,
};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use seed::SeedFile;

// ============================================================================
// Core Types
// ============================================================================

/// A confirmed seat in a target event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub id: Uuid,
    pub procedure_id: ProcedureId,
    pub event_id: EventId,
    pub participant: ParticipantId,
    pub initiator: ParticipantId,
    pub exam_only: bool,
    pub confirmed_at: DateTime<Utc>,
}

// ============================================================================
// Store Traits
// ============================================================================

/// Read access to campaigns
#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Campaigns whose show window has not expired at `now`
    async fn find_active_campaigns(&self, now: DateTime<Utc>) -> StoreResult<Vec<Campaign>>;

    /// Campaign by id, `None` if it does not exist (any more)
    async fn get_campaign_by_id(&self, id: CampaignId) -> StoreResult<Option<Campaign>>;
}

/// Read access to procedures
#[async_trait]
pub trait ProcedureStore: Send + Sync {
    /// Procedure by id, `None` if it does not exist (any more)
    async fn get_procedure_by_id(&self, id: ProcedureId) -> StoreResult<Option<Procedure>>;

    /// FIFO procedure by id; other variants count as absent
    async fn get_fifo_procedure_by_id(&self, id: ProcedureId) -> StoreResult<Option<Procedure>> {
        Ok(self
            .get_procedure_by_id(id)
            .await?
            .filter(|p| p.procedure_type() == ProcedureType::Fifo))
    }

    /// Draw procedure by id; other variants count as absent
    async fn get_draw_procedure_by_id(&self, id: ProcedureId) -> StoreResult<Option<Procedure>> {
        Ok(self
            .get_procedure_by_id(id)
            .await?
            .filter(|p| p.procedure_type() == ProcedureType::Draw))
    }
}

/// Persistence of submitted priority lists
#[async_trait]
pub trait PriorityListStore: Send + Sync {
    /// Lists a participant already submitted for a procedure
    async fn find_lists(
        &self,
        procedure: ProcedureId,
        participant: ParticipantId,
    ) -> StoreResult<Vec<PriorityList>>;

    /// Every list submitted for a procedure
    async fn find_all_lists(&self, procedure: ProcedureId) -> StoreResult<Vec<PriorityList>>;

    /// Persist a batch atomically: either every list gets an id or none is stored.
    ///
    /// `quota` is re-checked against the lists each participant holds at
    /// commit time, in the same atomic step as the insert, and a violation
    /// fails the whole batch with [`StoreError::Quota`].
    async fn save_lists(
        &self,
        quota: ListQuota,
        lists: Vec<PriorityList>,
    ) -> StoreResult<Vec<PriorityList>>;
}

/// Confirmed registrations and event capacity
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Atomically check capacity and store the registration
    async fn try_register(&self, registration: Registration) -> StoreResult<Registration>;

    /// Number of confirmed registrations for an event
    async fn count_for_event(&self, event: EventId) -> StoreResult<u32>;
}

/// Event eligibility rules
#[async_trait]
pub trait RuleChecker: Send + Sync {
    async fn is_registration_allowed(
        &self,
        participant: ParticipantId,
        campaign: &Campaign,
        event: EventId,
    ) -> StoreResult<bool>;
}

/// Lottery step run once a draw procedure reaches its draw time
#[async_trait]
pub trait DrawResolver: Send + Sync {
    /// Consume every submitted list and return the confirmed registrations
    async fn resolve(
        &self,
        procedure: &Procedure,
        lists: Vec<PriorityList>,
    ) -> StoreResult<Vec<Registration>>;
}

// ============================================================================
// Tick Scope
// ============================================================================

/// Opens a persistence context around each scan tick
pub trait TickScope: Send + Sync {
    fn open(&self) -> StoreResult<ScopeGuard>;
}

/// Releases its scope when dropped, including during unwinding
pub struct ScopeGuard {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ScopeGuard {
    /// Guard that runs `release` exactly once on drop
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Guard with nothing to release
    pub fn noop() -> Self {
        Self { release: None }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("armed", &self.release.is_some())
            .finish()
    }
}

/// Scope for backends without per-tick resources
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScope;

impl TickScope for NoopScope {
    fn open(&self) -> StoreResult<ScopeGuard> {
        Ok(ScopeGuard::noop())
    }
}

// ============================================================================
// Shared Collaborators
// ============================================================================

/// Bundle of collaborator handles shared by the orchestrator and the logics
#[derive(Clone)]
pub struct Stores {
    pub campaigns: Arc<dyn CampaignStore>,
    pub procedures: Arc<dyn ProcedureStore>,
    pub priority_lists: Arc<dyn PriorityListStore>,
    pub registrations: Arc<dyn RegistrationStore>,
    pub rules: Arc<dyn RuleChecker>,
    pub resolver: Arc<dyn DrawResolver>,
    pub scope: Arc<dyn TickScope>,
}

impl Stores {
    /// Wire every collaborator to the same in-memory store
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            campaigns: store.clone(),
            procedures: store.clone(),
            priority_lists: store.clone(),
            registrations: store.clone(),
            rules: store.clone(),
            resolver: store.clone(),
            scope: store,
        }
    }
}

impl fmt::Debug for Stores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_scope_guard_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        {
            let _guard = ScopeGuard::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scope_guard_releases_on_panic() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let result = std::panic::catch_unwind(move || {
            let _guard = ScopeGuard::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            panic!("tick body failed");
        });
        assert!(result.is_err());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_noop_scope() {
        let guard = NoopScope.open().unwrap();
        assert!(format!("{guard:?}").contains("false"));
    }
}
