//! Lifecycle events and status snapshots published by the orchestrator

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::campaign::{CampaignId, ProcedureId, ProcedureType};

/// Lifecycle callback of a [`ProcedureLogic`](super::ProcedureLogic)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleHook {
    BeforeActive,
    WhileActive,
    AfterActive,
}

impl LifecycleHook {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeActive => "before_active",
            Self::WhileActive => "while_active",
            Self::AfterActive => "after_active",
        }
    }
}

impl fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted while scanning
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProcedureEvent {
    /// A logic was created for a procedure that became current
    Activated {
        procedure_id: ProcedureId,
        campaign_id: CampaignId,
        procedure_type: ProcedureType,
        logic: &'static str,
        at: DateTime<Utc>,
    },

    /// A logic was retired after its procedure ended
    Expired {
        procedure_id: ProcedureId,
        campaign_id: CampaignId,
        at: DateTime<Utc>,
    },

    /// A logic was dropped because its procedure or campaign disappeared
    Reconciled {
        procedure_id: ProcedureId,
        campaign_id: CampaignId,
        at: DateTime<Utc>,
    },

    /// A lifecycle callback returned an error or panicked
    CallbackFailed {
        procedure_id: ProcedureId,
        hook: LifecycleHook,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl ProcedureEvent {
    pub fn procedure_id(&self) -> ProcedureId {
        match self {
            Self::Activated { procedure_id, .. }
            | Self::Expired { procedure_id, .. }
            | Self::Reconciled { procedure_id, .. }
            | Self::CallbackFailed { procedure_id, .. } => *procedure_id,
        }
    }
}

/// Outcome of one scan tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub reconciled: usize,
    pub expired: usize,
    pub activated: usize,
    pub failures: usize,
    pub running: usize,
}

impl ScanReport {
    /// Whether the tick changed the running set
    pub fn changed(&self) -> bool {
        self.reconciled + self.expired + self.activated > 0
    }
}

/// Orchestrator status information
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub is_running: bool,
    pub interval_ms: u64,
    pub last_scan: Option<DateTime<Utc>>,
    pub ticks: u64,
    pub running_procedures: Vec<ProcedureId>,
}

impl OrchestratorStatus {
    /// Format as display string
    pub fn display(&self) -> String {
        let mut output = String::from("Orchestrator Status\n");
        output.push_str(&format!("{:-<40}\n", ""));
        output.push_str(&format!("Running: {}\n", self.is_running));
        output.push_str(&format!("Interval: {}ms\n", self.interval_ms));
        match self.last_scan {
            Some(at) => output.push_str(&format!("Last Scan: {}\n", at.to_rfc3339())),
            None => output.push_str("Last Scan: never\n"),
        }
        output.push_str(&format!("Ticks: {}\n", self.ticks));

        if self.running_procedures.is_empty() {
            output.push_str("Active Procedures: none\n");
        } else {
            let ids: Vec<String> = self
                .running_procedures
                .iter()
                .map(ToString::to_string)
                .collect();
            output.push_str(&format!("Active Procedures: {}\n", ids.join(", ")));
        }

        output
    }
}
