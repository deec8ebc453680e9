//! Integration tests for the procedure orchestrator
//!
//! These tests verify the complete scan workflow:
//! - Activation and expiry of procedures over time
//! - Reconciliation against deleted records
//! - Timer state transitions
//! - Isolation of failing lifecycle callbacks

mod common;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use common::{day, fifo, Fixture};
use enroll_orchestrator::campaign::{CampaignId, Procedure, ProcedureId, ProcedureType};
use enroll_orchestrator::scheduler::{
    BoundProcedure, LifecycleHook, LogicRegistry, ProcedureEvent, ProcedureLogic, SchedulerError,
    SchedulerResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Test Logics
// ============================================================================

#[derive(Debug, Default)]
struct Calls {
    before: AtomicUsize,
    during: AtomicUsize,
    during_done: AtomicUsize,
    after: AtomicUsize,
}

impl Calls {
    fn snapshot(&self) -> (usize, usize, usize) {
        (
            self.before.load(Ordering::SeqCst),
            self.during.load(Ordering::SeqCst),
            self.after.load(Ordering::SeqCst),
        )
    }
}

/// Counts callbacks; optionally fails or panics in `before_active`, or
/// stalls in `while_active`
struct RecordingLogic {
    procedure: BoundProcedure,
    calls: Arc<Calls>,
    mode: Mode,
}

#[derive(Clone, Copy)]
enum Mode {
    Ok,
    Fail,
    Panic,
    Slow,
}

#[async_trait]
impl ProcedureLogic for RecordingLogic {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn procedure(&self) -> Procedure {
        self.procedure.snapshot()
    }

    fn rebind(&self, procedure: Procedure) {
        self.procedure.replace(procedure);
    }

    async fn before_active(&self) -> SchedulerResult<()> {
        self.calls.before.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            Mode::Ok | Mode::Slow => Ok(()),
            Mode::Fail => Err(SchedulerError::callback(
                self.procedure().id().to_string(),
                "before_active",
                "refused",
            )),
            Mode::Panic => panic!("logic blew up"),
        }
    }

    async fn while_active(&self) -> SchedulerResult<()> {
        self.calls.during.fetch_add(1, Ordering::SeqCst);
        if let Mode::Slow = self.mode {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.calls.during_done.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn after_active(&self) -> SchedulerResult<()> {
        self.calls.after.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn recording_registry(calls: Arc<Calls>, mode: Mode) -> LogicRegistry {
    LogicRegistry::new().register(ProcedureType::Fifo, move |procedure| {
        Arc::new(RecordingLogic {
            procedure: BoundProcedure::new(procedure),
            calls: calls.clone(),
            mode,
        }) as Arc<dyn ProcedureLogic>
    })
}

/// Registry where the procedure named "bad" gets a panicking logic
fn mixed_registry(good: Arc<Calls>, bad: Arc<Calls>) -> LogicRegistry {
    LogicRegistry::new().register(ProcedureType::Fifo, move |procedure| {
        let (calls, mode) = if procedure.name() == "bad" {
            (bad.clone(), Mode::Panic)
        } else {
            (good.clone(), Mode::Ok)
        };
        Arc::new(RecordingLogic {
            procedure: BoundProcedure::new(procedure),
            calls,
            mode,
        }) as Arc<dyn ProcedureLogic>
    })
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_no_double_activation() {
    let fx = Fixture::new(day(1));
    fx.insert_campaign("c", vec![fifo("f", 2, 6)]);
    let calls = Arc::new(Calls::default());
    fx.orchestrator
        .set_procedure_logic_type_list(recording_registry(calls.clone(), Mode::Ok))
        .await
        .unwrap();

    fx.orchestrator.scan_now().await.unwrap();
    assert_eq!(calls.snapshot(), (0, 0, 0));

    fx.clock.set(day(2));
    for _ in 0..5 {
        fx.orchestrator.scan_now().await.unwrap();
        fx.clock.advance(ChronoDuration::hours(6));
    }

    let (before, during, after) = calls.snapshot();
    assert_eq!(before, 1);
    assert_eq!(during, 4);
    assert_eq!(after, 0);
}

#[tokio::test]
async fn test_expiry_exactly_once() {
    let fx = Fixture::new(day(3));
    fx.insert_campaign("c", vec![fifo("f", 2, 4)]);
    let calls = Arc::new(Calls::default());
    fx.orchestrator
        .set_procedure_logic_type_list(recording_registry(calls.clone(), Mode::Ok))
        .await
        .unwrap();

    fx.orchestrator.scan_now().await.unwrap();

    // the end instant itself retires the procedure
    fx.clock.set(day(4));
    let report = fx.orchestrator.scan_now().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.activated, 0);

    fx.clock.set(day(5));
    fx.orchestrator.scan_now().await.unwrap();

    assert_eq!(calls.snapshot(), (1, 0, 1));
    assert!(fx
        .orchestrator
        .get_running_procedures()
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_procedure_not_activated_at_its_end() {
    let fx = Fixture::new(day(4));
    fx.insert_campaign("c", vec![fifo("f", 2, 4)]);

    let report = fx.orchestrator.scan_now().await.unwrap();
    assert_eq!(report.activated, 0);
    assert_eq!(report.running, 0);
}

#[tokio::test]
async fn test_consecutive_procedures_hand_over() {
    let fx = Fixture::new(day(3));
    let campaign = fx.insert_campaign("c", vec![fifo("first", 2, 4), fifo("second", 5, 8)]);
    let first = campaign.procedures()[0].id();
    let second = campaign.procedures()[1].id();

    fx.orchestrator.scan_now().await.unwrap();
    assert!(fx.orchestrator.find_active_logic_by_procedure(first).await.is_some());

    fx.clock.set(day(6));
    let report = fx.orchestrator.scan_now().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.activated, 1);

    assert!(fx.orchestrator.find_active_logic_by_procedure(first).await.is_none());
    assert!(fx.orchestrator.find_active_logic_by_procedure(second).await.is_some());
}

#[tokio::test]
async fn test_events_are_broadcast() {
    let fx = Fixture::new(day(3));
    let campaign = fx.insert_campaign("c", vec![fifo("f", 2, 4)]);
    let mut events = fx.orchestrator.subscribe();

    fx.orchestrator.scan_now().await.unwrap();
    fx.clock.set(day(4));
    fx.orchestrator.scan_now().await.unwrap();

    let activated = events.recv().await.unwrap();
    assert!(matches!(
        activated,
        ProcedureEvent::Activated { campaign_id, procedure_type: ProcedureType::Fifo, .. }
            if campaign_id == campaign.id
    ));
    let expired = events.recv().await.unwrap();
    assert!(matches!(expired, ProcedureEvent::Expired { .. }));
}

// ============================================================================
// Reconciliation
// ============================================================================

#[tokio::test]
async fn test_deleted_procedure_is_reconciled() {
    let fx = Fixture::new(day(3));
    let campaign = fx.insert_campaign("c", vec![fifo("f", 2, 6)]);
    let procedure = campaign.procedures()[0].id();
    let calls = Arc::new(Calls::default());
    fx.orchestrator
        .set_procedure_logic_type_list(recording_registry(calls.clone(), Mode::Ok))
        .await
        .unwrap();
    let mut events = fx.orchestrator.subscribe();

    fx.orchestrator.scan_now().await.unwrap();
    assert_eq!(fx.orchestrator.get_running_procedures().await.unwrap().len(), 1);

    assert!(fx.store.delete_procedure(procedure).unwrap());
    let running = fx.orchestrator.get_running_procedures().await.unwrap();
    assert!(running.is_empty());

    // retired silently, no after_active
    assert_eq!(calls.snapshot().2, 0);

    let _activated = events.recv().await.unwrap();
    let reconciled = events.recv().await.unwrap();
    assert!(matches!(reconciled, ProcedureEvent::Reconciled { procedure_id, .. } if procedure_id == procedure));
}

#[tokio::test]
async fn test_deleted_campaign_is_reconciled_on_tick() {
    let fx = Fixture::new(day(3));
    let campaign = fx.insert_campaign("c", vec![fifo("f", 2, 6)]);

    fx.orchestrator.scan_now().await.unwrap();
    assert!(fx.store.delete_campaign(campaign.id).unwrap());

    let report = fx.orchestrator.scan_now().await.unwrap();
    assert_eq!(report.reconciled, 1);
    assert_eq!(report.running, 0);
}

#[tokio::test]
async fn test_rescheduled_procedure_expires_earlier() {
    let fx = Fixture::new(day(3));
    let campaign = fx.insert_campaign("c", vec![fifo("f", 2, 10)]);
    let procedure = campaign.procedures()[0].id();

    fx.orchestrator.scan_now().await.unwrap();
    fx.store
        .reschedule_procedure(procedure, day(2), day(4))
        .unwrap();

    fx.clock.set(day(5));
    let report = fx.orchestrator.scan_now().await.unwrap();
    assert_eq!(report.reconciled, 0);
    assert_eq!(report.expired, 1);
}

#[tokio::test]
async fn test_store_outage_keeps_logics() {
    let fx = Fixture::new(day(3));
    fx.insert_campaign("c", vec![fifo("f", 2, 6)]);
    fx.orchestrator.scan_now().await.unwrap();

    fx.store.set_unavailable(true);
    assert!(fx.orchestrator.scan_now().await.is_err());
    fx.store.set_unavailable(false);

    assert_eq!(fx.orchestrator.get_running_procedures().await.unwrap().len(), 1);
}

// ============================================================================
// Failure Isolation
// ============================================================================

#[tokio::test]
async fn test_panicking_logic_does_not_starve_others() {
    let fx = Fixture::new(day(3));
    fx.insert_campaign("first", vec![fifo("bad", 2, 6)]);
    fx.insert_campaign("second", vec![fifo("good", 2, 6)]);

    let good = Arc::new(Calls::default());
    let bad = Arc::new(Calls::default());
    fx.orchestrator
        .set_procedure_logic_type_list(mixed_registry(good.clone(), bad.clone()))
        .await
        .unwrap();
    let mut events = fx.orchestrator.subscribe();

    let report = fx.orchestrator.scan_now().await.unwrap();
    assert_eq!(report.activated, 2);
    assert_eq!(report.failures, 1);

    // the failing logic stays tracked and is not activated again
    fx.orchestrator.scan_now().await.unwrap();
    assert_eq!(good.snapshot(), (1, 1, 0));
    assert_eq!(bad.snapshot(), (1, 1, 0));

    let mut failures = 0;
    while let Ok(event) = events.try_recv() {
        if let ProcedureEvent::CallbackFailed { hook, reason, .. } = event {
            assert_eq!(hook, LifecycleHook::BeforeActive);
            assert!(reason.contains("logic blew up"));
            failures += 1;
        }
    }
    assert_eq!(failures, 1);
}

#[tokio::test]
async fn test_failing_callback_is_reported() {
    let fx = Fixture::new(day(3));
    fx.insert_campaign("c", vec![fifo("f", 2, 6)]);
    let calls = Arc::new(Calls::default());
    fx.orchestrator
        .set_procedure_logic_type_list(recording_registry(calls.clone(), Mode::Fail))
        .await
        .unwrap();

    let report = fx.orchestrator.scan_now().await.unwrap();
    assert_eq!(report.failures, 1);
    assert_eq!(report.running, 1);
}

#[tokio::test]
async fn test_tick_scope_always_released() {
    let fx = Fixture::new(day(3));
    fx.insert_campaign("bad campaign", vec![fifo("bad", 2, 6)]);
    fx.orchestrator
        .set_procedure_logic_type_list(mixed_registry(
            Arc::new(Calls::default()),
            Arc::new(Calls::default()),
        ))
        .await
        .unwrap();

    for _ in 0..3 {
        fx.orchestrator.scan_now().await.unwrap();
    }
    fx.orchestrator.get_running_procedures().await.unwrap();

    let stats = fx.store.scope_stats();
    assert_eq!(stats.opened, 4);
    assert_eq!(stats.closed, 4);
}

// ============================================================================
// Timer
// ============================================================================

#[tokio::test]
async fn test_timer_state_transitions() {
    let fx = Fixture::new(day(3));

    let err = fx.orchestrator.stop_timer().await.unwrap_err();
    assert!(matches!(err, SchedulerError::IllegalState { .. }));

    let err = fx.orchestrator.find_active_campaigns().await.unwrap_err();
    assert!(matches!(err, SchedulerError::IllegalState { .. }));

    fx.orchestrator.start_timer().await.unwrap();
    assert!(fx.orchestrator.is_running());

    let err = fx.orchestrator.start_timer().await.unwrap_err();
    assert!(matches!(err, SchedulerError::IllegalState { .. }));

    fx.orchestrator.stop_timer().await.unwrap();
    assert!(!fx.orchestrator.is_running());
}

#[tokio::test]
async fn test_timer_drives_scans() {
    let fx = Fixture::new(day(3));
    fx.insert_campaign("c", vec![fifo("f", 2, 6)]);
    fx.orchestrator.set_timer_interval(10).await.unwrap();

    fx.orchestrator.start_timer().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    fx.orchestrator.stop_timer().await.unwrap();

    let status = fx.orchestrator.status().await;
    assert!(status.ticks >= 2);
    assert_eq!(status.running_procedures.len(), 1);

    let ticks = status.ticks;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fx.orchestrator.status().await.ticks, ticks);
}

#[tokio::test]
async fn test_stop_timer_waits_for_running_tick() {
    let fx = Fixture::new(day(3));
    fx.insert_campaign("c", vec![fifo("f", 2, 6)]);
    let calls = Arc::new(Calls::default());
    fx.orchestrator
        .set_procedure_logic_type_list(recording_registry(calls.clone(), Mode::Slow))
        .await
        .unwrap();
    fx.orchestrator.scan_now().await.unwrap();

    fx.orchestrator.set_timer_interval(10).await.unwrap();
    fx.orchestrator.start_timer().await.unwrap();
    while calls.during.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(calls.during_done.load(Ordering::SeqCst), 0);

    fx.orchestrator.stop_timer().await.unwrap();
    let entered = calls.during.load(Ordering::SeqCst);
    assert_eq!(calls.during_done.load(Ordering::SeqCst), entered);

    let ticks = fx.orchestrator.status().await.ticks;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fx.orchestrator.status().await.ticks, ticks);
    assert_eq!(calls.during.load(Ordering::SeqCst), entered);
}

#[tokio::test]
async fn test_interval_change_restarts_loop() {
    let fx = Fixture::new(day(3));
    fx.orchestrator.set_timer_interval(3_600_000).await.unwrap();
    fx.orchestrator.start_timer().await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    let ticks = fx.orchestrator.status().await.ticks;

    fx.orchestrator.set_timer_interval(10).await.unwrap();
    assert!(fx.orchestrator.is_running());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(fx.orchestrator.status().await.ticks > ticks + 1);

    assert!(fx.orchestrator.set_timer_interval(-1).await.is_err());
    assert_eq!(fx.orchestrator.interval_ms(), 10);
    fx.orchestrator.stop_timer().await.unwrap();
}

#[tokio::test]
async fn test_find_active_campaigns_self_heals() {
    let fx = Fixture::new(day(3));
    fx.insert_campaign("first", vec![fifo("f", 2, 6)]);
    fx.orchestrator.set_timer_interval(3_600_000).await.unwrap();
    fx.orchestrator.start_timer().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let late = fx.insert_campaign("late", vec![fifo("g", 2, 6)]);
    assert!(fx
        .orchestrator
        .find_active_logic_by_campaign(late.id)
        .await
        .is_err());

    let campaigns = fx.orchestrator.find_active_campaigns().await.unwrap();
    assert_eq!(campaigns.len(), 2);
    assert!(fx
        .orchestrator
        .find_active_logic_by_campaign(late.id)
        .await
        .is_ok());

    fx.orchestrator.stop_timer().await.unwrap();
}

// ============================================================================
// Lookups and Registry
// ============================================================================

#[tokio::test]
async fn test_lookup_asymmetry() {
    let fx = Fixture::new(day(3));
    fx.orchestrator.scan_now().await.unwrap();

    let err = fx
        .orchestrator
        .find_active_logic_by_campaign(CampaignId(77))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::NotFound { .. }));

    let err = fx
        .orchestrator
        .find_active_logic_by_campaign(CampaignId::TRANSIENT)
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidArgument { .. }));

    assert!(fx
        .orchestrator
        .find_active_logic_by_procedure(ProcedureId(77))
        .await
        .is_none());
}

#[tokio::test]
async fn test_empty_registry_rejected() {
    let fx = Fixture::new(day(3));
    let err = fx
        .orchestrator
        .set_procedure_logic_type_list(LogicRegistry::new())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidArgument { .. }));
}

#[tokio::test]
async fn test_unmapped_procedure_type_is_skipped() {
    let fx = Fixture::new(day(3));
    fx.insert_campaign("c", vec![common::draw("d", 2, 6, 1, 1)]);
    fx.orchestrator
        .set_procedure_logic_type_list(recording_registry(Arc::new(Calls::default()), Mode::Ok))
        .await
        .unwrap();

    let report = fx.orchestrator.scan_now().await.unwrap();
    assert_eq!(report.activated, 0);
    assert_eq!(report.failures, 0);
}

#[tokio::test]
async fn test_running_procedures_are_a_copy() {
    let fx = Fixture::new(day(3));
    fx.insert_campaign("c", vec![fifo("f", 2, 6)]);
    fx.orchestrator.scan_now().await.unwrap();

    let mut running = fx.orchestrator.get_running_procedures().await.unwrap();
    running.clear();
    assert_eq!(fx.orchestrator.get_running_procedures().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_status_display_after_scan() {
    let fx = Fixture::new(day(3));
    let campaign = fx.insert_campaign("c", vec![fifo("f", 2, 6)]);
    fx.orchestrator.scan_now().await.unwrap();

    let text = fx.orchestrator.status().await.display();
    assert!(text.contains("Ticks: 1"));
    assert!(text.contains(&campaign.procedures()[0].id().to_string()));
}
