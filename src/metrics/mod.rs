//! Prometheus metrics for the orchestrator and allocation requests
//!
//! This module provides metrics tracking for:
//! - Scan loop: activations, expirations, reconciliation drops, callback failures, tick duration
//! - Allocation: FIFO registration and priority-list submission outcomes
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for scan loop metrics
struct SchedulerMetrics {
    activations: CounterVec,
    expirations: Counter,
    reconciliations: Counter,
    callback_failures: CounterVec,
    scan_duration: Histogram,
    running_procedures: Gauge,
    timer_running: Gauge,
}

/// Container for allocation metrics
struct EnrollmentMetrics {
    registrations: CounterVec,
    submissions: CounterVec,
}

static SCHEDULER_METRICS: OnceLock<SchedulerMetrics> = OnceLock::new();

static ENROLLMENT_METRICS: OnceLock<EnrollmentMetrics> = OnceLock::new();

/// Flag to track if initialization was attempted
static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers anything.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = enroll_orchestrator::metrics::init_metrics() {
///     tracing::warn!("Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.set(true).is_err() {
        return Ok(());
    }

    let scheduler = SchedulerMetrics {
        activations: register_counter_vec!(
            "enroll_procedure_activations_total",
            "Procedure logics activated, by procedure type",
            &["procedure_type"]
        )?,
        expirations: register_counter!(
            "enroll_procedure_expirations_total",
            "Procedure logics retired after their window ended"
        )?,
        reconciliations: register_counter!(
            "enroll_procedure_reconciliations_total",
            "Procedure logics dropped because their records disappeared"
        )?,
        callback_failures: register_counter_vec!(
            "enroll_callback_failures_total",
            "Lifecycle callbacks that failed or panicked, by hook",
            &["hook"]
        )?,
        scan_duration: register_histogram!(
            "enroll_scan_duration_seconds",
            "Time spent in one scan tick",
            vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
        )?,
        running_procedures: register_gauge!(
            "enroll_running_procedures",
            "Number of currently tracked procedure logics"
        )?,
        timer_running: register_gauge!(
            "enroll_timer_running",
            "Whether the scan timer is running (1 = yes, 0 = no)"
        )?,
    };

    let enrollment = EnrollmentMetrics {
        registrations: register_counter_vec!(
            "enroll_registrations_total",
            "FIFO registration attempts by outcome",
            &["outcome"]
        )?,
        submissions: register_counter_vec!(
            "enroll_priority_list_submissions_total",
            "Priority list submissions by outcome",
            &["outcome"]
        )?,
    };

    SCHEDULER_METRICS
        .set(scheduler)
        .map_err(|_| "Scheduler metrics already initialized")?;
    ENROLLMENT_METRICS
        .set(enrollment)
        .map_err(|_| "Enrollment metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    SCHEDULER_METRICS.get().is_some() && ENROLLMENT_METRICS.get().is_some()
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// ============================================================================
// Scan Loop
// ============================================================================

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start timing one scan tick
pub fn start_scan_timer() -> MetricsTimer {
    match SCHEDULER_METRICS.get() {
        Some(m) => MetricsTimer::new(m.scan_duration.start_timer()),
        None => MetricsTimer::noop(),
    }
}

pub fn record_activation(procedure_type: &str) {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.activations.with_label_values(&[procedure_type]).inc();
    }
}

pub fn record_expiration() {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.expirations.inc();
    }
}

pub fn record_reconciliation() {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.reconciliations.inc();
    }
}

pub fn record_callback_failure(hook: &str) {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.callback_failures.with_label_values(&[hook]).inc();
    }
}

/// Update scan loop gauges
pub fn update_scheduler_state(timer_running: bool, running_procedures: usize) {
    if let Some(m) = SCHEDULER_METRICS.get() {
        m.timer_running.set(if timer_running { 1.0 } else { 0.0 });
        m.running_procedures.set(running_procedures as f64);
    }
}

// ============================================================================
// Allocation
// ============================================================================

pub fn record_registration(outcome: &str) {
    if let Some(m) = ENROLLMENT_METRICS.get() {
        m.registrations.with_label_values(&[outcome]).inc();
    }
}

pub fn record_submission(outcome: &str) {
    if let Some(m) = ENROLLMENT_METRICS.get() {
        m.submissions.with_label_values(&[outcome]).inc();
    }
}
