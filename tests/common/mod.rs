//! Common test utilities

use chrono::{DateTime, TimeZone, Utc};
use enroll_orchestrator::campaign::{Campaign, CampaignId, DrawSettings, EventId, Procedure};
use enroll_orchestrator::clock::ManualClock;
use enroll_orchestrator::scheduler::ProcedureOrchestrator;
use enroll_orchestrator::store::{MemoryStore, Stores};
use std::sync::Arc;

/// Midnight UTC of a day in September 2024
pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, d, 0, 0, 0).unwrap()
}

/// Everything an orchestrator test needs, wired to one in-memory store
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub orchestrator: Arc<ProcedureOrchestrator>,
}

impl Fixture {
    /// Empty store with the clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start));
        let orchestrator = Arc::new(ProcedureOrchestrator::new(
            Stores::from_memory(store.clone()),
            clock.clone(),
        ));
        Self {
            store,
            clock,
            orchestrator,
        }
    }

    #[allow(dead_code)]
    pub fn stores(&self) -> Stores {
        Stores::from_memory(self.store.clone())
    }

    /// Persist a campaign visible on days 1 to 30, targeting events 1 to 5
    pub fn insert_campaign(&self, name: &str, procedures: Vec<Procedure>) -> Campaign {
        let mut campaign = Campaign::new(CampaignId::TRANSIENT, name, day(1), day(30))
            .unwrap()
            .with_events((1..=5).map(EventId));
        for error in campaign.add_procedures(procedures) {
            panic!("fixture procedure rejected: {error}");
        }
        self.store.insert_campaign(campaign).unwrap()
    }
}

/// FIFO procedure open from `start` to `end` (days of September)
pub fn fifo(name: &str, start: u32, end: u32) -> Procedure {
    Procedure::fifo(name, CampaignId::TRANSIENT, day(start), day(end)).unwrap()
}

/// Draw procedure with its draw time at the end of the window
#[allow(dead_code)]
pub fn draw(name: &str, start: u32, end: u32, max_lists: u32, max_items: u32) -> Procedure {
    let settings = DrawSettings::new(day(end), max_lists, max_items).unwrap();
    Procedure::draw(name, CampaignId::TRANSIENT, day(start), day(end), settings).unwrap()
}
