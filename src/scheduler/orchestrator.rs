//! Procedure orchestrator
//!
//! Keeps the set of running [`ProcedureLogic`] instances in step with the
//! campaigns and procedures in the store. Every tick runs three phases in
//! a fixed order under one lock:
//!
//! 1. **Reconcile** - drop logics whose procedure or campaign was deleted
//! 2. **Expire** - `after_active` for ended procedures, `while_active` for the rest
//! 3. **Activate** - `before_active` for current procedures not tracked yet
//!
//! A failing or panicking callback is logged and reported as a
//! [`ProcedureEvent::CallbackFailed`]; it never aborts the rest of the tick.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::error::{SchedulerError, SchedulerResult};
use super::events::{LifecycleHook, OrchestratorStatus, ProcedureEvent, ScanReport};
use super::logic::{LogicRegistry, ProcedureLogic};
use crate::campaign::{Campaign, CampaignId, Procedure, ProcedureId};
use crate::clock::SharedClock;
use crate::metrics;
use crate::store::{StoreResult, Stores};

/// Default scan period
pub const DEFAULT_INTERVAL_MS: u64 = 60_000;

/// Default capacity of the lifecycle event channel
pub const DEFAULT_EVENT_BUFFER: usize = 100;

// ============================================================================
// Orchestrator Configuration
// ============================================================================

/// Configuration for the procedure orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Scan period in milliseconds
    pub interval_ms: u64,

    /// Capacity of the lifecycle event channel
    pub event_buffer: usize,

    /// Start the scan timer as soon as the service comes up
    pub autostart: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            event_buffer: DEFAULT_EVENT_BUFFER,
            autostart: true,
        }
    }
}

impl OrchestratorConfig {
    /// Create a new config builder
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.interval_ms == 0 {
            return Err(SchedulerError::invalid_argument(
                "interval_ms",
                "scan interval must be positive",
            ));
        }
        if self.event_buffer == 0 {
            return Err(SchedulerError::invalid_argument(
                "event_buffer",
                "event buffer must hold at least one event",
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Builder for OrchestratorConfig
#[derive(Debug, Default)]
pub struct OrchestratorConfigBuilder {
    interval_ms: Option<u64>,
    event_buffer: Option<usize>,
    autostart: Option<bool>,
}

impl OrchestratorConfigBuilder {
    pub fn interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = Some(interval_ms);
        self
    }

    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = Some(capacity);
        self
    }

    pub fn autostart(mut self, value: bool) -> Self {
        self.autostart = Some(value);
        self
    }

    /// Build the config
    pub fn build(self) -> SchedulerResult<OrchestratorConfig> {
        let config = OrchestratorConfig {
            interval_ms: self.interval_ms.unwrap_or(DEFAULT_INTERVAL_MS),
            event_buffer: self.event_buffer.unwrap_or(DEFAULT_EVENT_BUFFER),
            autostart: self.autostart.unwrap_or(true),
        };
        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

struct ScanState {
    running: Vec<Arc<dyn ProcedureLogic>>,
    registry: LogicRegistry,
    last_scan: Option<DateTime<Utc>>,
    ticks: u64,
}

struct TimerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Drives the lifecycle of every active procedure
pub struct ProcedureOrchestrator {
    stores: Stores,
    clock: SharedClock,
    state: Mutex<ScanState>,
    timer: Mutex<Option<TimerHandle>>,
    running: AtomicBool,
    interval_ms: AtomicU64,
    events: broadcast::Sender<ProcedureEvent>,
}

impl ProcedureOrchestrator {
    /// Create an orchestrator with default settings and the standard logics
    pub fn new(stores: Stores, clock: SharedClock) -> Self {
        Self::build(&OrchestratorConfig::default(), stores, clock)
    }

    /// Create an orchestrator from validated settings
    pub fn from_config(
        config: &OrchestratorConfig,
        stores: Stores,
        clock: SharedClock,
    ) -> SchedulerResult<Self> {
        config.validate()?;
        Ok(Self::build(config, stores, clock))
    }

    fn build(config: &OrchestratorConfig, stores: Stores, clock: SharedClock) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let registry = LogicRegistry::standard(stores.clone(), clock.clone());

        Self {
            stores,
            clock,
            state: Mutex::new(ScanState {
                running: Vec::new(),
                registry,
                last_scan: None,
                ticks: 0,
            }),
            timer: Mutex::new(None),
            running: AtomicBool::new(false),
            interval_ms: AtomicU64::new(config.interval_ms.max(1)),
            events,
        }
    }

    /// Replace the logic registry before the orchestrator is shared
    pub fn with_registry(mut self, registry: LogicRegistry) -> SchedulerResult<Self> {
        if registry.is_empty() {
            return Err(SchedulerError::invalid_argument(
                "registry",
                "at least one logic binding is required",
            ));
        }
        self.state.get_mut().registry = registry;
        Ok(self)
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<ProcedureEvent> {
        self.events.subscribe()
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    // ------------------------------------------------------------------------
    // Timer
    // ------------------------------------------------------------------------

    /// Start periodic scanning; the first tick fires immediately
    pub async fn start_timer(self: &Arc<Self>) -> SchedulerResult<()> {
        let mut timer = self.timer.lock().await;
        if timer.is_some() {
            return Err(SchedulerError::illegal_state("timer already running"));
        }

        self.state.lock().await.last_scan = None;
        *timer = Some(self.spawn_scan_loop());
        self.running.store(true, Ordering::SeqCst);

        tracing::info!(interval_ms = self.interval_ms(), "Procedure timer started");
        Ok(())
    }

    /// Stop periodic scanning, waiting for an in-flight tick to finish
    pub async fn stop_timer(&self) -> SchedulerResult<()> {
        let mut timer = self.timer.lock().await;
        let handle = timer
            .take()
            .ok_or_else(|| SchedulerError::illegal_state("timer is not running"))?;
        self.running.store(false, Ordering::SeqCst);
        Self::shutdown(handle).await;

        let running = self.state.lock().await.running.len();
        metrics::update_scheduler_state(false, running);
        tracing::info!("Procedure timer stopped");
        Ok(())
    }

    /// Change the scan period; a running timer restarts with the new period
    pub async fn set_timer_interval(self: &Arc<Self>, interval_ms: i64) -> SchedulerResult<()> {
        let interval_ms = u64::try_from(interval_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or_else(|| {
                SchedulerError::invalid_argument(
                    "interval_ms",
                    format!("scan interval must be positive, got {interval_ms}"),
                )
            })?;

        let mut timer = self.timer.lock().await;
        self.interval_ms.store(interval_ms, Ordering::SeqCst);

        if let Some(handle) = timer.take() {
            Self::shutdown(handle).await;
            *timer = Some(self.spawn_scan_loop());
            tracing::info!(interval_ms, "Procedure timer restarted");
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.load(Ordering::SeqCst)
    }

    fn spawn_scan_loop(self: &Arc<Self>) -> TimerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let orchestrator: Weak<Self> = Arc::downgrade(self);
        let period = Duration::from_millis(self.interval_ms());

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        tracing::debug!("Scan loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(orchestrator) = orchestrator.upgrade() else {
                            break;
                        };
                        match AssertUnwindSafe(orchestrator.scan_now()).catch_unwind().await {
                            Ok(Ok(_)) => {}
                            Ok(Err(e)) => tracing::warn!(error = %e, "Scan tick failed"),
                            Err(panic) => tracing::error!(
                                reason = %panic_reason(panic.as_ref()),
                                "Scan tick panicked"
                            ),
                        }
                    }
                }
            }
        });

        TimerHandle { shutdown, task }
    }

    async fn shutdown(handle: TimerHandle) {
        let _ = handle.shutdown.send(true);
        if let Err(e) = handle.task.await {
            tracing::error!(error = %e, "Scan loop terminated abnormally");
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Campaigns the store reports as active.
    ///
    /// Forces an immediate scan first when the number of active campaigns
    /// differs from the number of tracked procedures.
    pub async fn find_active_campaigns(&self) -> SchedulerResult<Vec<Campaign>> {
        if !self.is_running() {
            return Err(SchedulerError::illegal_state(
                "active campaigns are only known while the timer runs",
            ));
        }

        let campaigns = self
            .stores
            .campaigns
            .find_active_campaigns(self.clock.now())
            .await?;

        let tracked = {
            let state = self.state.lock().await;
            state
                .running
                .iter()
                .map(|logic| logic.procedure_id())
                .collect::<BTreeSet<ProcedureId>>()
                .len()
        };

        if campaigns.len() != tracked {
            tracing::debug!(
                active_campaigns = campaigns.len(),
                tracked_procedures = tracked,
                "Tracked set out of step, scanning now"
            );
            self.scan_now().await?;
        }

        Ok(campaigns)
    }

    /// Running logic of a campaign; a missing logic is an error
    pub async fn find_active_logic_by_campaign(
        &self,
        campaign: CampaignId,
    ) -> SchedulerResult<Arc<dyn ProcedureLogic>> {
        if !campaign.is_persisted() {
            return Err(SchedulerError::invalid_argument(
                "campaign",
                "a persisted campaign is required",
            ));
        }

        let state = self.state.lock().await;
        state
            .running
            .iter()
            .find(|logic| logic.campaign_id() == campaign)
            .cloned()
            .ok_or_else(|| SchedulerError::not_found(format!("active logic for campaign {campaign}")))
    }

    /// Running logic of a procedure; a missing logic is `None`
    pub async fn find_active_logic_by_procedure(
        &self,
        procedure: ProcedureId,
    ) -> Option<Arc<dyn ProcedureLogic>> {
        let state = self.state.lock().await;
        state
            .running
            .iter()
            .find(|logic| logic.procedure_id() == procedure)
            .cloned()
    }

    /// Snapshot of the running logics, after dropping deleted procedures
    pub async fn get_running_procedures(&self) -> SchedulerResult<Vec<Arc<dyn ProcedureLogic>>> {
        let mut state = self.state.lock().await;
        let _scope = self.stores.scope.open()?;
        self.reconcile(&mut state.running, self.clock.now()).await;
        Ok(state.running.clone())
    }

    /// Replace the mapping from procedure variants to logic implementations
    pub async fn set_procedure_logic_type_list(
        &self,
        registry: LogicRegistry,
    ) -> SchedulerResult<()> {
        if registry.is_empty() {
            return Err(SchedulerError::invalid_argument(
                "registry",
                "at least one logic binding is required",
            ));
        }
        tracing::debug!(types = ?registry.procedure_types(), "Logic registry replaced");
        self.state.lock().await.registry = registry;
        Ok(())
    }

    /// Current status
    pub async fn status(&self) -> OrchestratorStatus {
        let state = self.state.lock().await;
        OrchestratorStatus {
            is_running: self.is_running(),
            interval_ms: self.interval_ms(),
            last_scan: state.last_scan,
            ticks: state.ticks,
            running_procedures: state
                .running
                .iter()
                .map(|logic| logic.procedure_id())
                .collect(),
        }
    }

    // ------------------------------------------------------------------------
    // Scan
    // ------------------------------------------------------------------------

    /// Run one tick immediately
    pub async fn scan_now(&self) -> SchedulerResult<ScanReport> {
        let _timer = metrics::start_scan_timer();
        let mut state = self.state.lock().await;
        let _scope = self.stores.scope.open()?;
        let now = self.clock.now();
        let mut report = ScanReport::default();

        let ScanState {
            running, registry, ..
        } = &mut *state;
        report.reconciled = self.reconcile(running, now).await;
        self.expire(running, now, &mut report).await;
        let activation = self.activate(running, registry, now, &mut report).await;

        state.last_scan = Some(now);
        state.ticks += 1;
        report.running = state.running.len();
        metrics::update_scheduler_state(self.is_running(), report.running);

        tracing::debug!(
            tick = state.ticks,
            reconciled = report.reconciled,
            expired = report.expired,
            activated = report.activated,
            failures = report.failures,
            running = report.running,
            "Scan tick finished"
        );
        activation.map(|()| report)
    }

    async fn reconcile(&self, running: &mut Vec<Arc<dyn ProcedureLogic>>, now: DateTime<Utc>) -> usize {
        let mut kept = Vec::with_capacity(running.len());
        let mut dropped = 0;

        for logic in running.drain(..) {
            let procedure_id = logic.procedure_id();
            match self.backing_record(procedure_id).await {
                Ok(Some(fresh)) => {
                    logic.rebind(fresh);
                    kept.push(logic);
                }
                Ok(None) => {
                    dropped += 1;
                    let campaign_id = logic.campaign_id();
                    tracing::warn!(
                        procedure_id = %procedure_id,
                        campaign_id = %campaign_id,
                        "Procedure disappeared from the store, dropping its logic"
                    );
                    metrics::record_reconciliation();
                    self.emit(ProcedureEvent::Reconciled {
                        procedure_id,
                        campaign_id,
                        at: now,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        procedure_id = %procedure_id,
                        error = %e,
                        "Could not verify procedure, keeping its logic"
                    );
                    kept.push(logic);
                }
            }
        }

        *running = kept;
        dropped
    }

    /// Fresh copy of a procedure, `None` if it or its campaign is gone
    async fn backing_record(&self, id: ProcedureId) -> StoreResult<Option<Procedure>> {
        let Some(fresh) = self.stores.procedures.get_procedure_by_id(id).await? else {
            return Ok(None);
        };
        let campaign = self
            .stores
            .campaigns
            .get_campaign_by_id(fresh.campaign_id())
            .await?;
        Ok(campaign.map(|_| fresh))
    }

    async fn expire(
        &self,
        running: &mut Vec<Arc<dyn ProcedureLogic>>,
        now: DateTime<Utc>,
        report: &mut ScanReport,
    ) {
        let mut kept = Vec::with_capacity(running.len());

        for logic in running.drain(..) {
            if logic.is_expired_at(now) {
                let procedure_id = logic.procedure_id();
                if !self.run_hook(&logic, LifecycleHook::AfterActive, now).await {
                    report.failures += 1;
                }
                report.expired += 1;
                tracing::info!(
                    procedure_id = %procedure_id,
                    logic = logic.name(),
                    "Procedure expired"
                );
                metrics::record_expiration();
                self.emit(ProcedureEvent::Expired {
                    procedure_id,
                    campaign_id: logic.campaign_id(),
                    at: now,
                });
            } else {
                if !self.run_hook(&logic, LifecycleHook::WhileActive, now).await {
                    report.failures += 1;
                }
                kept.push(logic);
            }
        }

        *running = kept;
    }

    async fn activate(
        &self,
        running: &mut Vec<Arc<dyn ProcedureLogic>>,
        registry: &LogicRegistry,
        now: DateTime<Utc>,
        report: &mut ScanReport,
    ) -> SchedulerResult<()> {
        let campaigns = self.stores.campaigns.find_active_campaigns(now).await?;

        for campaign in &campaigns {
            let Some(procedure) = campaign.find_current_procedure(now) else {
                continue;
            };
            if procedure.is_expired_at(now)
                || running
                    .iter()
                    .any(|logic| logic.procedure_id() == procedure.id())
            {
                continue;
            }

            let logics = registry.instantiate(procedure);
            if logics.is_empty() {
                tracing::debug!(
                    procedure_id = %procedure.id(),
                    procedure_type = %procedure.procedure_type(),
                    "No logic registered for procedure type"
                );
                continue;
            }

            for logic in logics {
                if !self.run_hook(&logic, LifecycleHook::BeforeActive, now).await {
                    report.failures += 1;
                }
                report.activated += 1;
                tracing::info!(
                    procedure_id = %procedure.id(),
                    campaign_id = %campaign.id,
                    logic = logic.name(),
                    "Procedure activated"
                );
                metrics::record_activation(procedure.procedure_type().as_str());
                self.emit(ProcedureEvent::Activated {
                    procedure_id: procedure.id(),
                    campaign_id: campaign.id,
                    procedure_type: procedure.procedure_type(),
                    logic: logic.name(),
                    at: now,
                });
                running.push(logic);
            }
        }

        Ok(())
    }

    /// Run one callback in isolation; returns whether it succeeded
    async fn run_hook(
        &self,
        logic: &Arc<dyn ProcedureLogic>,
        hook: LifecycleHook,
        now: DateTime<Utc>,
    ) -> bool {
        let call = match hook {
            LifecycleHook::BeforeActive => logic.before_active(),
            LifecycleHook::WhileActive => logic.while_active(),
            LifecycleHook::AfterActive => logic.after_active(),
        };

        let reason = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("panicked: {}", panic_reason(panic.as_ref())),
        };

        let procedure_id = logic.procedure_id();
        tracing::error!(
            procedure_id = %procedure_id,
            logic = logic.name(),
            hook = %hook,
            %reason,
            "Lifecycle callback failed"
        );
        metrics::record_callback_failure(hook.as_str());
        self.emit(ProcedureEvent::CallbackFailed {
            procedure_id,
            hook,
            reason,
            at: now,
        });
        false
    }

    fn emit(&self, event: ProcedureEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for ProcedureOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureOrchestrator")
            .field("running", &self.is_running())
            .field("interval_ms", &self.interval_ms())
            .finish_non_exhaustive()
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
