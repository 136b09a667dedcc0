//! Executor metrics collection
//!
//! Prometheus-compatible counters and histograms for operation attempts, per-operation
//! outcomes, batch outcomes, and backoff delays.

use std::time::Duration;

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    /// Counter for operation invocations, retries included
    pub static ref OPERATION_ATTEMPTS: IntCounter = register_int_counter!(
        "stockrunner_operation_attempts_total",
        "Total number of operation invocations including retries"
    ).expect("operation attempts counter registers once");

    /// Counter for final per-operation outcomes
    pub static ref OPERATION_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "stockrunner_operation_outcomes_total",
        "Total number of operations by final outcome",
        &["outcome"]
    ).expect("operation outcomes counter registers once");

    /// Counter for batch outcomes
    pub static ref BATCHES: IntCounterVec = register_int_counter_vec!(
        "stockrunner_batches_total",
        "Total number of batches by outcome",
        &["outcome"]
    ).expect("batch counter registers once");

    /// Histogram for backoff sleeps
    pub static ref BACKOFF_DELAY: Histogram = register_histogram!(
        "stockrunner_backoff_delay_seconds",
        "Backoff delay before a retry in seconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).expect("backoff histogram registers once");

    /// Histogram for batch wall time
    pub static ref BATCH_DURATION: HistogramVec = register_histogram_vec!(
        "stockrunner_batch_duration_seconds",
        "Batch execution duration in seconds",
        &["mode"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]
    ).expect("batch duration histogram registers once");
}

/// Executor metrics collector
pub struct ExecutorMetrics;

impl ExecutorMetrics {
    /// Record one invocation of an operation
    pub fn record_attempt() {
        OPERATION_ATTEMPTS.inc();
    }

    /// Record the final outcome of one operation (`success`, `exhausted`, `cancelled`)
    pub fn record_operation(outcome: &str) {
        OPERATION_OUTCOMES.with_label_values(&[outcome]).inc();
    }

    /// Record a backoff sleep
    pub fn record_backoff(delay: Duration) {
        BACKOFF_DELAY.observe(delay.as_secs_f64());
    }

    /// Record a finished batch
    pub fn record_batch(outcome: &str, mode: &str, duration: Duration) {
        BATCHES.with_label_values(&[outcome]).inc();
        BATCH_DURATION
            .with_label_values(&[mode])
            .observe(duration.as_secs_f64());
    }

    /// Get all metrics in Prometheus text format
    pub fn export() -> Result<String, String> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| format!("Failed to encode metrics: {}", e))?;
        String::from_utf8(buffer).map_err(|e| format!("Failed to convert metrics to UTF-8: {}", e))
    }
}
