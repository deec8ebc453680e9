//! Procedures: time-bounded allocation windows
//!
//! A procedure belongs to exactly one campaign and is either a FIFO window
//! (immediate, capacity-checked admission) or a draw window (priority lists
//! collected until the draw time, then resolved as a lottery).
//!
//! All interval checks use closed bounds: a procedure covers every instant
//! `t` with `start <= t <= end`, and two procedures whose windows merely
//! touch are considered overlapping.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use super::error::{CampaignError, CampaignResult};
use super::ids::{CampaignId, ProcedureId};
use super::priority::{ListQuota, PriorityList};

// ============================================================================
// Procedure Types
// ============================================================================

/// Variant tag used to pick the matching logic implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcedureType {
    /// First-come-first-served registration window
    Fifo,
    /// Priority-list lottery window
    Draw,
}

impl ProcedureType {
    /// Stable lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fifo => "fifo",
            Self::Draw => "draw",
        }
    }
}

impl fmt::Display for ProcedureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProcedureType {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "draw" => Ok(Self::Draw),
            other => Err(CampaignError::invalid_argument(
                "procedure_type",
                format!("unknown procedure type '{other}'"),
            )),
        }
    }
}

// ============================================================================
// Draw Settings
// ============================================================================

/// Extra state carried by draw procedures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrawSettings {
    draw_time: DateTime<Utc>,
    max_priority_lists: u32,
    max_priority_list_items: u32,
    rule_based: bool,
    priority_lists: Vec<PriorityList>,
}

impl DrawSettings {
    /// Create draw settings; limits must be at least one
    pub fn new(
        draw_time: DateTime<Utc>,
        max_priority_lists: u32,
        max_priority_list_items: u32,
    ) -> CampaignResult<Self> {
        if max_priority_lists == 0 {
            return Err(CampaignError::invalid_argument(
                "max_priority_lists",
                "must be at least 1",
            ));
        }
        if max_priority_list_items == 0 {
            return Err(CampaignError::invalid_argument(
                "max_priority_list_items",
                "must be at least 1",
            ));
        }

        Ok(Self {
            draw_time,
            max_priority_lists,
            max_priority_list_items,
            rule_based: false,
            priority_lists: Vec::new(),
        })
    }

    /// Enforce event eligibility rules on list targets
    pub fn with_rule_based(mut self, rule_based: bool) -> Self {
        self.rule_based = rule_based;
        self
    }

    pub fn draw_time(&self) -> DateTime<Utc> {
        self.draw_time
    }

    pub fn max_priority_lists(&self) -> u32 {
        self.max_priority_lists
    }

    pub fn max_priority_list_items(&self) -> u32 {
        self.max_priority_list_items
    }

    pub fn is_rule_based(&self) -> bool {
        self.rule_based
    }

    /// Limits every participant's submissions are checked against
    pub fn quota(&self) -> ListQuota {
        ListQuota {
            max_lists: self.max_priority_lists,
            max_items: self.max_priority_list_items,
        }
    }

    /// Lists submitted so far, as loaded by the store
    pub fn priority_lists(&self) -> &[PriorityList] {
        &self.priority_lists
    }

    /// Replace the attached lists (used by stores when loading a procedure)
    pub fn set_priority_lists(&mut self, lists: Vec<PriorityList>) {
        self.priority_lists = lists;
    }
}

/// Variant-specific part of a procedure
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProcedureKind {
    Fifo,
    Draw(DrawSettings),
}

impl ProcedureKind {
    pub fn procedure_type(&self) -> ProcedureType {
        match self {
            Self::Fifo => ProcedureType::Fifo,
            Self::Draw(_) => ProcedureType::Draw,
        }
    }
}

// ============================================================================
// Procedure
// ============================================================================

/// A named, time-bounded allocation window owned by one campaign
#[derive(Debug, Clone, Serialize)]
pub struct Procedure {
    id: ProcedureId,
    #[serde(skip)]
    key: Uuid,
    name: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    campaign_id: CampaignId,
    mandator_id: i64,
    kind: ProcedureKind,
}

impl Procedure {
    /// Create a transient FIFO procedure
    pub fn fifo(
        name: impl Into<String>,
        campaign_id: CampaignId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CampaignResult<Self> {
        Self::build(name.into(), campaign_id, start, end, ProcedureKind::Fifo)
    }

    /// Create a transient draw procedure
    pub fn draw(
        name: impl Into<String>,
        campaign_id: CampaignId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        settings: DrawSettings,
    ) -> CampaignResult<Self> {
        check_draw_time(settings.draw_time, start, end)?;
        Self::build(
            name.into(),
            campaign_id,
            start,
            end,
            ProcedureKind::Draw(settings),
        )
    }

    fn build(
        name: String,
        campaign_id: CampaignId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        kind: ProcedureKind,
    ) -> CampaignResult<Self> {
        check_interval(start, end)?;
        Ok(Self {
            id: ProcedureId::TRANSIENT,
            key: Uuid::new_v4(),
            name,
            start,
            end,
            campaign_id,
            mandator_id: 0,
            kind,
        })
    }

    /// Attach the tenant this procedure belongs to
    pub fn with_mandator(mut self, mandator_id: i64) -> Self {
        self.mandator_id = mandator_id;
        self
    }

    /// Record the durable id handed out by the store
    pub fn assign_id(&mut self, id: ProcedureId) {
        self.id = id;
    }

    pub fn id(&self) -> ProcedureId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn campaign_id(&self) -> CampaignId {
        self.campaign_id
    }

    pub(crate) fn bind_campaign(&mut self, campaign_id: CampaignId) {
        self.campaign_id = campaign_id;
    }

    pub fn mandator_id(&self) -> i64 {
        self.mandator_id
    }

    pub fn kind(&self) -> &ProcedureKind {
        &self.kind
    }

    pub fn procedure_type(&self) -> ProcedureType {
        self.kind.procedure_type()
    }

    /// Draw settings, if this is a draw procedure
    pub fn draw_settings(&self) -> Option<&DrawSettings> {
        match &self.kind {
            ProcedureKind::Draw(settings) => Some(settings),
            ProcedureKind::Fifo => None,
        }
    }

    pub fn draw_settings_mut(&mut self) -> Option<&mut DrawSettings> {
        match &mut self.kind {
            ProcedureKind::Draw(settings) => Some(settings),
            ProcedureKind::Fifo => None,
        }
    }

    /// Reschedule the window. Rejects `start >= end` and, for draws, a draw
    /// time falling outside the new window. On error nothing changes.
    pub fn set_interval(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> CampaignResult<()> {
        check_interval(start, end)?;
        if let Some(settings) = self.draw_settings() {
            check_draw_time(settings.draw_time, start, end)?;
        }
        self.start = start;
        self.end = end;
        Ok(())
    }

    /// Move the draw time of a draw procedure
    pub fn set_draw_time(&mut self, draw_time: DateTime<Utc>) -> CampaignResult<()> {
        let (start, end) = (self.start, self.end);
        let settings = self.draw_settings_mut().ok_or_else(|| {
            CampaignError::invalid_argument("draw_time", "not a draw procedure")
        })?;
        check_draw_time(draw_time, start, end)?;
        settings.draw_time = draw_time;
        Ok(())
    }

    /// Whether `instant` lies within `[start, end]`
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Whether the two closed windows intersect (touching endpoints count)
    pub fn overlaps(&self, other: &Procedure) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Whether the window has closed at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.end <= now
    }
}

/// Equal by id once both sides are persisted, by factory key otherwise
impl PartialEq for Procedure {
    fn eq(&self, other: &Self) -> bool {
        if self.id.is_persisted() && other.id.is_persisted() {
            self.id == other.id
        } else {
            self.key == other.key
        }
    }
}

impl Eq for Procedure {}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} '{}' [{} - {}]",
            self.procedure_type(),
            self.id,
            self.name,
            self.start.format("%Y-%m-%d %H:%M"),
            self.end.format("%Y-%m-%d %H:%M")
        )
    }
}

fn check_interval(start: DateTime<Utc>, end: DateTime<Utc>) -> CampaignResult<()> {
    if start >= end {
        return Err(CampaignError::InvalidInterval { start, end });
    }
    Ok(())
}

fn check_draw_time(
    draw_time: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> CampaignResult<()> {
    if draw_time < start || draw_time > end {
        return Err(CampaignError::InvalidDrawTime {
            draw_time,
            start,
            end,
        });
    }
    Ok(())
}
