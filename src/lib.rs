//! enroll-orchestrator - time-driven course enrollment
//!
//! Campaigns group non-overlapping allocation windows (procedures). A
//! periodic scan activates the procedure that is current in each campaign,
//! retires the ones that ended, and drops the ones deleted from the store.
//! While a procedure is active, participants register first-come
//! first-served (FIFO) or submit ranked priority lists for a draw.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`campaign`] - Campaigns, procedures, draw settings and priority lists
//! - [`store`] - Collaborator traits and the in-memory store
//! - [`scheduler`] - The orchestrator, the logic registry and the FIFO/draw logics
//! - [`enrollment`] - Registration and submission entry points
//! - [`clock`] - Injectable time source
//! - [`config`] - Configuration management and settings
//! - [`metrics`] - Prometheus metrics
//! - [`error`] - Unified error type
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use enroll_orchestrator::clock::system_clock;
//! use enroll_orchestrator::config::Config;
//! use enroll_orchestrator::scheduler::ProcedureOrchestrator;
//! use enroll_orchestrator::store::{MemoryStore, Stores};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!     let stores = Stores::from_memory(Arc::new(MemoryStore::new()));
//!     let orchestrator = Arc::new(ProcedureOrchestrator::from_config(
//!         &config.orchestrator,
//!         stores,
//!         system_clock(),
//!     )?);
//!     orchestrator.start_timer().await?;
//!     Ok(())
//! }
//! ```

pub mod campaign;
pub mod clock;
pub mod config;
pub mod enrollment;
pub mod error;
pub mod metrics;
pub mod scheduler;
pub mod store;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::campaign::{
        Campaign, CampaignId, DrawSettings, EventId, ParticipantId, PriorityList, Procedure,
        ProcedureId, ProcedureType,
    };
    pub use crate::clock::{Clock, ManualClock, SharedClock, SystemClock};
    pub use crate::config::Config;
    pub use crate::enrollment::{EnrollmentError, EnrollmentService};
    pub use crate::error::{EnrollErrorTrait, Error, ErrorCategory, Result};
    pub use crate::scheduler::{
        LogicRegistry, ProcedureEvent, ProcedureLogic, ProcedureOrchestrator, RegistrationRequest,
    };
    pub use crate::store::{MemoryStore, Stores};
}

// Direct re-exports for convenience
pub use campaign::{Campaign, Procedure};
pub use scheduler::ProcedureOrchestrator;
