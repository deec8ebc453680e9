//! Lifecycle contract for running procedures
//!
//! One [`ProcedureLogic`] instance governs one currently active procedure:
//!
//! ```text
//! not yet active ──before_active──▶ active ──after_active──▶ retired
//!                                    │  ▲
//!                                    └──┘ while_active (every scan tick)
//! ```
//!
//! Instances are created by the [`LogicRegistry`] when the orchestrator
//! first sees a procedure become current, and are discarded once retired.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, RwLock};

use super::draw::DrawLogic;
use super::error::SchedulerResult;
use super::fifo::FifoLogic;
use crate::campaign::{CampaignId, Procedure, ProcedureId, ProcedureType};
use crate::clock::SharedClock;
use crate::store::Stores;

/// Behaviour bound to one active procedure
#[async_trait]
pub trait ProcedureLogic: Send + Sync {
    /// Short name of the implementation, used in logs and metrics
    fn name(&self) -> &'static str;

    /// Latest known snapshot of the governed procedure
    fn procedure(&self) -> Procedure;

    /// Id of the governed procedure
    fn procedure_id(&self) -> ProcedureId {
        self.procedure().id()
    }

    /// Campaign owning the governed procedure
    fn campaign_id(&self) -> CampaignId {
        self.procedure().campaign_id()
    }

    /// Whether the governed procedure has ended at `now`
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.procedure().is_expired_at(now)
    }

    /// Replace the snapshot after the store reported a newer version
    fn rebind(&self, procedure: Procedure);

    /// Called once, when the procedure becomes current
    async fn before_active(&self) -> SchedulerResult<()>;

    /// Called on every scan tick while the procedure stays current
    async fn while_active(&self) -> SchedulerResult<()>;

    /// Called once, on the first tick at which the procedure has ended
    async fn after_active(&self) -> SchedulerResult<()>;

    fn as_fifo(&self) -> Option<&FifoLogic> {
        None
    }

    fn as_draw(&self) -> Option<&DrawLogic> {
        None
    }
}

impl fmt::Debug for dyn ProcedureLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureLogic")
            .field("name", &self.name())
            .field("procedure", &self.procedure_id())
            .finish()
    }
}

/// Procedure snapshot shared between the scan loop and request handlers
#[derive(Debug)]
pub struct BoundProcedure {
    inner: RwLock<Procedure>,
}

impl BoundProcedure {
    pub fn new(procedure: Procedure) -> Self {
        Self {
            inner: RwLock::new(procedure),
        }
    }

    pub fn snapshot(&self) -> Procedure {
        self.read(Procedure::clone)
    }

    /// Inspect the current snapshot in place
    pub fn read<R>(&self, f: impl FnOnce(&Procedure) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        f(&*guard)
    }

    pub fn replace(&self, procedure: Procedure) {
        *self.inner.write().unwrap_or_else(|e| e.into_inner()) = procedure;
    }
}

// ============================================================================
// Logic Registry
// ============================================================================

/// Constructor for one logic implementation
pub type LogicFactory = Arc<dyn Fn(Procedure) -> Arc<dyn ProcedureLogic> + Send + Sync>;

/// Maps procedure variants to the logic implementations that govern them
#[derive(Clone, Default)]
pub struct LogicRegistry {
    bindings: Vec<(ProcedureType, LogicFactory)>,
}

impl LogicRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// FIFO procedures run [`FifoLogic`], draw procedures run [`DrawLogic`]
    pub fn standard(stores: Stores, clock: SharedClock) -> Self {
        let fifo_stores = stores.clone();
        let fifo_clock = clock.clone();
        Self::new()
            .register(ProcedureType::Fifo, move |procedure| {
                Arc::new(FifoLogic::new(procedure, fifo_stores.clone(), fifo_clock.clone()))
                    as Arc<dyn ProcedureLogic>
            })
            .register(ProcedureType::Draw, move |procedure| {
                Arc::new(DrawLogic::new(procedure, stores.clone(), clock.clone()))
                    as Arc<dyn ProcedureLogic>
            })
    }

    /// Add a binding; several bindings may target the same variant
    pub fn register<F>(mut self, procedure_type: ProcedureType, factory: F) -> Self
    where
        F: Fn(Procedure) -> Arc<dyn ProcedureLogic> + Send + Sync + 'static,
    {
        self.bindings.push((procedure_type, Arc::new(factory)));
        self
    }

    /// One fresh logic per binding matching the procedure's variant
    pub fn instantiate(&self, procedure: &Procedure) -> Vec<Arc<dyn ProcedureLogic>> {
        let procedure_type = procedure.procedure_type();
        self.bindings
            .iter()
            .filter(|(ty, _)| *ty == procedure_type)
            .map(|(_, factory)| factory(procedure.clone()))
            .collect()
    }

    /// Variants with at least one binding
    pub fn procedure_types(&self) -> Vec<ProcedureType> {
        let mut types = Vec::new();
        for (ty, _) in &self.bindings {
            if !types.contains(ty) {
                types.push(*ty);
            }
        }
        types
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl fmt::Debug for LogicRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicRegistry")
            .field("bindings", &self.len())
            .field("types", &self.procedure_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::{CampaignId, DrawSettings};
    use crate::clock::system_clock;
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};

    fn stores() -> Stores {
        Stores::from_memory(Arc::new(MemoryStore::new()))
    }

    fn fifo() -> Procedure {
        let now = Utc::now();
        Procedure::fifo("f", CampaignId(1), now, now + Duration::hours(1)).unwrap()
    }

    fn draw() -> Procedure {
        let now = Utc::now();
        let settings = DrawSettings::new(now + Duration::hours(1), 1, 1).unwrap();
        Procedure::draw("d", CampaignId(1), now, now + Duration::hours(1), settings).unwrap()
    }

    #[test]
    fn test_standard_registry_dispatch() {
        let registry = LogicRegistry::standard(stores(), system_clock());
        assert_eq!(registry.len(), 2);

        let logics = registry.instantiate(&fifo());
        assert_eq!(logics.len(), 1);
        assert!(logics[0].as_fifo().is_some());
        assert!(logics[0].as_draw().is_none());

        let logics = registry.instantiate(&draw());
        assert_eq!(logics.len(), 1);
        assert!(logics[0].as_draw().is_some());
    }

    #[test]
    fn test_multiple_bindings_per_type() {
        let s = stores();
        let clock = system_clock();
        let registry = LogicRegistry::standard(s.clone(), clock.clone()).register(
            ProcedureType::Fifo,
            move |procedure| {
                Arc::new(FifoLogic::new(procedure, s.clone(), clock.clone())) as Arc<dyn ProcedureLogic>
            },
        );

        assert_eq!(registry.instantiate(&fifo()).len(), 2);
        assert_eq!(registry.instantiate(&draw()).len(), 1);
    }

    #[test]
    fn test_empty_registry_instantiates_nothing() {
        let registry = LogicRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.instantiate(&fifo()).is_empty());
    }

    #[test]
    fn test_bound_procedure_replace() {
        let bound = BoundProcedure::new(fifo());
        let mut next = bound.snapshot();
        next.rename("renamed");
        bound.replace(next);
        assert_eq!(bound.snapshot().name(), "renamed");
    }
}
