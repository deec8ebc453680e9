//! Procedure scheduling
//!
//! This module turns the static campaign data into running allocation
//! windows. A periodic scan decides which procedures are current and
//! drives one [`ProcedureLogic`] per procedure through its lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    ProcedureOrchestrator                      │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐    │
//! │  │  Scan loop  │  │   Logic     │  │   Event broadcast   │    │
//! │  │ (interval)  │  │  Registry   │  │  (ProcedureEvent)   │    │
//! │  └──────┬──────┘  └──────┬──────┘  └──────────┬──────────┘    │
//! │         └────────────────┼────────────────────┘               │
//! │                   ┌──────▼──────┐                             │
//! │                   │   running   │                             │
//! │                   │  procedures │                             │
//! │                   └──────┬──────┘                             │
//! └──────────────────────────┼────────────────────────────────────┘
//!                ┌───────────┴───────────┐
//!                ▼                       ▼
//!          ┌───────────┐           ┌───────────┐
//!          │ FifoLogic │           │ DrawLogic │
//!          └───────────┘           └───────────┘
//! ```
//!
//! # Modules
//!
//! - [`orchestrator`] - scan loop, timer control and lookups
//! - [`logic`] - the lifecycle trait and the type-keyed registry
//! - [`fifo`] - immediate registration
//! - [`draw`] - priority-list submission and draw handover
//! - [`events`] - lifecycle events and status snapshots
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use enroll_orchestrator::clock::system_clock;
//! use enroll_orchestrator::scheduler::ProcedureOrchestrator;
//! use enroll_orchestrator::store::{MemoryStore, Stores};
//!
//! let stores = Stores::from_memory(Arc::new(MemoryStore::new()));
//! let orchestrator = Arc::new(ProcedureOrchestrator::new(stores, system_clock()));
//! let mut events = orchestrator.subscribe();
//!
//! orchestrator.start_timer().await?;
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod draw;
pub mod error;
pub mod events;
pub mod fifo;
pub mod logic;
pub mod orchestrator;

pub use draw::DrawLogic;
pub use error::{SchedulerError, SchedulerResult};
pub use events::{LifecycleHook, OrchestratorStatus, ProcedureEvent, ScanReport};
pub use fifo::{FifoLogic, RegistrationRequest};
pub use logic::{BoundProcedure, LogicFactory, LogicRegistry, ProcedureLogic};
pub use orchestrator::{
    OrchestratorConfig, OrchestratorConfigBuilder, ProcedureOrchestrator, DEFAULT_EVENT_BUFFER,
    DEFAULT_INTERVAL_MS,
};
