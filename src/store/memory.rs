//! In-memory implementation of every collaborator trait
//!
//! Useful for testing and for the demo CLI, without database dependencies.
//! All state sits behind one lock so check-then-write operations such as
//! [`PriorityListStore::save_lists`] and [`RegistrationStore::try_register`]
//! are atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::error::{StoreError, StoreResult};
use super::{
    CampaignStore, DrawResolver, PriorityListStore, ProcedureStore, Registration,
    RegistrationStore, RuleChecker, ScopeGuard, TickScope,
};
use crate::campaign::{
    Campaign, CampaignId, EventId, ListQuota, ParticipantId, PriorityList, PriorityListId,
    Procedure, ProcedureId,
};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    campaigns: BTreeMap<CampaignId, Campaign>,
    priority_lists: BTreeMap<PriorityListId, PriorityList>,
    registrations: Vec<Registration>,
    capacities: HashMap<EventId, u32>,
    denied: HashSet<(ParticipantId, EventId)>,
    resolved_draws: Vec<(ProcedureId, usize)>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn reserve_id(&mut self, id: i64) {
        self.next_id = self.next_id.max(id);
    }

    fn campaign_of(&self, procedure: ProcedureId) -> Option<&Campaign> {
        self.campaigns
            .values()
            .find(|c| c.procedures().iter().any(|p| p.id() == procedure))
    }

    fn campaign_of_mut(&mut self, procedure: ProcedureId) -> Option<&mut Campaign> {
        self.campaigns
            .values_mut()
            .find(|c| c.procedures().iter().any(|p| p.id() == procedure))
    }

    fn lists_of(&self, procedure: ProcedureId, participant: ParticipantId) -> Vec<PriorityList> {
        self.priority_lists
            .values()
            .filter(|l| l.procedure_id == procedure && l.participant == participant)
            .cloned()
            .collect()
    }

    fn lists_for(&self, procedure: ProcedureId) -> Vec<PriorityList> {
        self.priority_lists
            .values()
            .filter(|l| l.procedure_id == procedure)
            .cloned()
            .collect()
    }
}

/// Counters for opened and released tick scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScopeStats {
    pub opened: usize,
    pub closed: usize,
}

/// Thread-safe in-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    unavailable: AtomicBool,
    scopes_opened: AtomicUsize,
    scopes_closed: Arc<AtomicUsize>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryState>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("memory store switched off"));
        }
        self.state
            .read()
            .map_err(|_| StoreError::unavailable("memory store lock poisoned"))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryState>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("memory store switched off"));
        }
        self.state
            .write()
            .map_err(|_| StoreError::unavailable("memory store lock poisoned"))
    }

    /// Simulate an outage: every call fails with `Unavailable` while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    // ------------------------------------------------------------------------
    // Campaigns and procedures
    // ------------------------------------------------------------------------

    /// Persist a campaign with its procedures, assigning ids to transient ones
    pub fn insert_campaign(&self, mut campaign: Campaign) -> StoreResult<Campaign> {
        let mut state = self.write()?;

        if campaign.id.is_persisted() {
            state.reserve_id(campaign.id.0);
        } else {
            campaign.id = CampaignId(state.allocate_id());
        }

        let procedures = campaign.procedures().to_vec();
        for procedure in &procedures {
            campaign.remove_procedure(procedure)?;
        }
        for mut procedure in procedures {
            if procedure.id().is_persisted() {
                state.reserve_id(procedure.id().0);
            } else {
                procedure.assign_id(ProcedureId(state.allocate_id()));
            }
            campaign.add_procedure(procedure)?;
        }

        state.campaigns.insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    /// Apply a new procedure to a stored campaign
    pub fn add_procedure(
        &self,
        campaign_id: CampaignId,
        mut procedure: Procedure,
    ) -> StoreResult<Procedure> {
        let mut state = self.write()?;
        if !state.campaigns.contains_key(&campaign_id) {
            return Err(StoreError::Conflict {
                reason: format!("campaign {campaign_id} does not exist"),
            });
        }

        if !procedure.id().is_persisted() {
            let id = state.allocate_id();
            procedure.assign_id(ProcedureId(id));
        }

        let campaign = state
            .campaigns
            .get_mut(&campaign_id)
            .ok_or_else(|| StoreError::Conflict {
                reason: format!("campaign {campaign_id} does not exist"),
            })?;
        campaign.add_procedure(procedure.clone())?;
        procedure.bind_campaign(campaign_id);
        Ok(procedure)
    }

    /// Move a stored procedure's window in place
    pub fn reschedule_procedure(
        &self,
        id: ProcedureId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Procedure> {
        let mut state = self.write()?;
        let campaign = state.campaign_of_mut(id).ok_or_else(|| StoreError::Conflict {
            reason: format!("procedure {id} does not exist"),
        })?;

        let mut procedure = campaign
            .procedures()
            .iter()
            .find(|p| p.id() == id)
            .cloned()
            .ok_or_else(|| StoreError::Conflict {
                reason: format!("procedure {id} does not exist"),
            })?;
        procedure.set_interval(start, end)?;
        campaign.update_procedure(procedure.clone())?;
        Ok(procedure)
    }

    /// Delete a procedure; returns whether it existed
    pub fn delete_procedure(&self, id: ProcedureId) -> StoreResult<bool> {
        let mut state = self.write()?;
        let Some(campaign) = state.campaign_of_mut(id) else {
            return Ok(false);
        };
        let Some(procedure) = campaign.procedures().iter().find(|p| p.id() == id).cloned() else {
            return Ok(false);
        };
        campaign.remove_procedure(&procedure)?;
        state.priority_lists.retain(|_, l| l.procedure_id != id);
        Ok(true)
    }

    /// Delete a campaign with all its procedures; returns whether it existed
    pub fn delete_campaign(&self, id: CampaignId) -> StoreResult<bool> {
        let mut state = self.write()?;
        let Some(campaign) = state.campaigns.remove(&id) else {
            return Ok(false);
        };
        let procedure_ids: HashSet<ProcedureId> =
            campaign.procedures().iter().map(Procedure::id).collect();
        state
            .priority_lists
            .retain(|_, l| !procedure_ids.contains(&l.procedure_id));
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Events and rules
    // ------------------------------------------------------------------------

    /// Limit the number of seats of an event (unlimited when unset)
    pub fn set_capacity(&self, event: EventId, capacity: u32) -> StoreResult<()> {
        self.write()?.capacities.insert(event, capacity);
        Ok(())
    }

    /// Make the rule checker refuse `participant` for `event`
    pub fn deny_registration(&self, participant: ParticipantId, event: EventId) -> StoreResult<()> {
        self.write()?.denied.insert((participant, event));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    /// All confirmed registrations
    pub fn registrations(&self) -> StoreResult<Vec<Registration>> {
        Ok(self.read()?.registrations.clone())
    }

    /// Draw handovers seen by the resolver: procedure and number of lists
    pub fn resolved_draws(&self) -> StoreResult<Vec<(ProcedureId, usize)>> {
        Ok(self.read()?.resolved_draws.clone())
    }

    /// Every stored campaign, visible or not
    pub fn all_campaigns(&self) -> StoreResult<Vec<Campaign>> {
        Ok(self.read()?.campaigns.values().cloned().collect())
    }

    pub fn scope_stats(&self) -> ScopeStats {
        ScopeStats {
            opened: self.scopes_opened.load(Ordering::SeqCst),
            closed: self.scopes_closed.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl CampaignStore for MemoryStore {
    async fn find_active_campaigns(&self, now: DateTime<Utc>) -> StoreResult<Vec<Campaign>> {
        let state = self.read()?;
        Ok(state
            .campaigns
            .values()
            .filter(|c| c.is_visible_at(now))
            .cloned()
            .collect())
    }

    async fn get_campaign_by_id(&self, id: CampaignId) -> StoreResult<Option<Campaign>> {
        Ok(self.read()?.campaigns.get(&id).cloned())
    }
}

#[async_trait]
impl ProcedureStore for MemoryStore {
    async fn get_procedure_by_id(&self, id: ProcedureId) -> StoreResult<Option<Procedure>> {
        let state = self.read()?;
        let Some(campaign) = state.campaign_of(id) else {
            return Ok(None);
        };

        let mut procedure = campaign.procedures().iter().find(|p| p.id() == id).cloned();
        if let Some(settings) = procedure.as_mut().and_then(Procedure::draw_settings_mut) {
            settings.set_priority_lists(state.lists_for(id));
        }
        Ok(procedure)
    }
}

#[async_trait]
impl PriorityListStore for MemoryStore {
    async fn find_lists(
        &self,
        procedure: ProcedureId,
        participant: ParticipantId,
    ) -> StoreResult<Vec<PriorityList>> {
        Ok(self.read()?.lists_of(procedure, participant))
    }

    async fn find_all_lists(&self, procedure: ProcedureId) -> StoreResult<Vec<PriorityList>> {
        Ok(self.read()?.lists_for(procedure))
    }

    async fn save_lists(
        &self,
        quota: ListQuota,
        lists: Vec<PriorityList>,
    ) -> StoreResult<Vec<PriorityList>> {
        let mut state = self.write()?;

        if let Some(orphan) = lists
            .iter()
            .find(|l| state.campaign_of(l.procedure_id).is_none())
        {
            return Err(StoreError::Conflict {
                reason: format!("procedure {} does not exist", orphan.procedure_id),
            });
        }

        let owners: BTreeSet<(ProcedureId, ParticipantId)> = lists
            .iter()
            .map(|l| (l.procedure_id, l.participant))
            .collect();
        for (procedure, participant) in owners {
            let submitted: Vec<PriorityList> = lists
                .iter()
                .filter(|l| l.procedure_id == procedure && l.participant == participant)
                .cloned()
                .collect();
            quota.check(&state.lists_of(procedure, participant), &submitted)?;
        }

        let mut saved = Vec::with_capacity(lists.len());
        for mut list in lists {
            if !list.id.is_persisted() {
                list.id = PriorityListId(state.allocate_id());
            }
            state.priority_lists.insert(list.id, list.clone());
            saved.push(list);
        }
        Ok(saved)
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn try_register(&self, registration: Registration) -> StoreResult<Registration> {
        let mut state = self.write()?;

        let event = registration.event_id;
        let participant = registration.participant;
        if state
            .registrations
            .iter()
            .any(|r| r.event_id == event && r.participant == participant)
        {
            return Err(StoreError::AlreadyRegistered { event, participant });
        }

        if let Some(&capacity) = state.capacities.get(&event) {
            let taken = state
                .registrations
                .iter()
                .filter(|r| r.event_id == event)
                .count();
            if taken >= capacity as usize {
                return Err(StoreError::EventFull { event });
            }
        }

        state.registrations.push(registration.clone());
        Ok(registration)
    }

    async fn count_for_event(&self, event: EventId) -> StoreResult<u32> {
        let state = self.read()?;
        let count = state
            .registrations
            .iter()
            .filter(|r| r.event_id == event)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

#[async_trait]
impl RuleChecker for MemoryStore {
    async fn is_registration_allowed(
        &self,
        participant: ParticipantId,
        _campaign: &Campaign,
        event: EventId,
    ) -> StoreResult<bool> {
        Ok(!self.read()?.denied.contains(&(participant, event)))
    }
}

/// Records the handover and confirms nothing; the lottery itself lives elsewhere
#[async_trait]
impl DrawResolver for MemoryStore {
    async fn resolve(
        &self,
        procedure: &Procedure,
        lists: Vec<PriorityList>,
    ) -> StoreResult<Vec<Registration>> {
        self.write()?
            .resolved_draws
            .push((procedure.id(), lists.len()));
        Ok(Vec::new())
    }
}

impl TickScope for MemoryStore {
    fn open(&self) -> StoreResult<ScopeGuard> {
        self.scopes_opened.fetch_add(1, Ordering::SeqCst);
        let closed = self.scopes_closed.clone();
        Ok(ScopeGuard::new(move || {
            closed.fetch_add(1, Ordering::SeqCst);
        }))
    }
}
