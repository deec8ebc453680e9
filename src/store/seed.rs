//! TOML seed data for the in-memory store
//!
//! ```toml
//! [[campaigns]]
//! id = 1
//! name = "Winter term"
//! start_show = "2024-09-01T00:00:00Z"
//! end_show = "2024-10-01T00:00:00Z"
//! events = [101, 102]
//!
//! [[campaigns.procedures]]
//! name = "Lottery"
//! type = "draw"
//! start = "2024-09-02T08:00:00Z"
//! end = "2024-09-05T08:00:00Z"
//! draw_time = "2024-09-05T08:00:00Z"
//! max_priority_lists = 2
//! max_priority_list_items = 3
//!
//! [[events]]
//! id = 101
//! capacity = 20
//! ```

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::Path;

use super::error::{StoreError, StoreResult};
use super::memory::MemoryStore;
use crate::campaign::{
    Campaign, CampaignId, DrawSettings, EventId, Procedure, ProcedureId, ProcedureType,
};

/// Root of a seed file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub campaigns: Vec<CampaignSeed>,
    #[serde(default)]
    pub events: Vec<EventSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CampaignSeed {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub start_show: DateTime<Utc>,
    pub end_show: DateTime<Utc>,
    #[serde(default)]
    pub events: Vec<i64>,
    #[serde(default)]
    pub study_courses: Vec<i64>,
    #[serde(default)]
    pub procedures: Vec<ProcedureSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcedureSeed {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub procedure_type: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub mandator_id: i64,
    pub draw_time: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub max_priority_lists: u32,
    #[serde(default = "default_limit")]
    pub max_priority_list_items: u32,
    #[serde(default)]
    pub rule_based: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventSeed {
    pub id: i64,
    pub capacity: u32,
}

fn default_limit() -> u32 {
    1
}

impl SeedFile {
    /// Parse seed TOML
    pub fn parse(content: &str) -> StoreResult<Self> {
        toml::from_str(content).map_err(|e| StoreError::invalid_seed(e.to_string()))
    }

    /// Read and parse a seed file
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::invalid_seed(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&content)
    }

    /// Build a store holding every seeded campaign and event.
    ///
    /// Procedures that overlap an earlier one of the same campaign are
    /// skipped with a warning; every other validation failure aborts.
    pub fn into_store(self) -> StoreResult<MemoryStore> {
        let store = MemoryStore::new();

        for seed in self.campaigns {
            let campaign = seed.build()?;
            let campaign = store.insert_campaign(campaign)?;
            tracing::debug!(
                campaign_id = %campaign.id,
                procedures = campaign.procedures().len(),
                "Seeded campaign"
            );
        }

        for event in self.events {
            store.set_capacity(EventId(event.id), event.capacity)?;
        }

        Ok(store)
    }
}

impl CampaignSeed {
    fn build(self) -> StoreResult<Campaign> {
        let id = CampaignId(self.id);
        let mut campaign = Campaign::new(id, self.name, self.start_show, self.end_show)?
            .with_events(self.events.into_iter().map(EventId))
            .with_study_courses(self.study_courses);

        let procedures = self
            .procedures
            .into_iter()
            .map(|p| p.build(id))
            .collect::<StoreResult<Vec<_>>>()?;

        for error in campaign.add_procedures(procedures) {
            tracing::warn!(campaign = %campaign.name, error = %error, "Skipping seeded procedure");
        }

        Ok(campaign)
    }
}

impl ProcedureSeed {
    fn build(self, campaign_id: CampaignId) -> StoreResult<Procedure> {
        let procedure_type: ProcedureType = self.procedure_type.parse()?;

        let mut procedure = match procedure_type {
            ProcedureType::Fifo => Procedure::fifo(self.name, campaign_id, self.start, self.end)?,
            ProcedureType::Draw => {
                let draw_time = self.draw_time.unwrap_or(self.end);
                let settings = DrawSettings::new(
                    draw_time,
                    self.max_priority_lists,
                    self.max_priority_list_items,
                )?
                .with_rule_based(self.rule_based);
                Procedure::draw(self.name, campaign_id, self.start, self.end, settings)?
            }
        }
        .with_mandator(self.mandator_id);

        if self.id != 0 {
            procedure.assign_id(ProcedureId(self.id));
        }
        Ok(procedure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CampaignStore, ProcedureStore};
    use chrono::TimeZone;

    const SEED: &str = r#"
[[campaigns]]
id = 1
name = "Winter term"
start_show = "2024-09-01T00:00:00Z"
end_show = "2024-10-01T00:00:00Z"
events = [101, 102]

[[campaigns.procedures]]
id = 10
name = "Lottery"
type = "draw"
start = "2024-09-02T08:00:00Z"
end = "2024-09-05T08:00:00Z"
max_priority_lists = 2
max_priority_list_items = 3

[[campaigns.procedures]]
id = 11
name = "Late registration"
type = "fifo"
start = "2024-09-06T08:00:00Z"
end = "2024-09-09T08:00:00Z"

[[events]]
id = 101
capacity = 20
"#;

    #[tokio::test]
    async fn test_seed_into_store() {
        let store = SeedFile::parse(SEED).unwrap().into_store().unwrap();

        let campaign = store.get_campaign_by_id(CampaignId(1)).await.unwrap().unwrap();
        assert_eq!(campaign.procedures().len(), 2);
        assert!(campaign.has_event(EventId(102)));

        let draw = store.get_procedure_by_id(ProcedureId(10)).await.unwrap().unwrap();
        let settings = draw.draw_settings().unwrap();
        assert_eq!(settings.max_priority_lists(), 2);
        // draw time defaults to the end of the window
        assert_eq!(
            settings.draw_time(),
            Utc.with_ymd_and_hms(2024, 9, 5, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_unknown_procedure_type_rejected() {
        let seed = SEED.replace("type = \"fifo\"", "type = \"auction\"");
        let err = SeedFile::parse(&seed).unwrap().into_store().unwrap_err();
        assert!(matches!(err, StoreError::Entity(_)));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let err = SeedFile::parse("[[campaigns]\nname=").unwrap_err();
        assert!(matches!(err, StoreError::InvalidSeed { .. }));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.toml");
        std::fs::write(&path, SEED).unwrap();
        let seed = SeedFile::from_file(&path).unwrap();
        assert_eq!(seed.campaigns.len(), 1);
        assert_eq!(seed.events.len(), 1);
    }
}
