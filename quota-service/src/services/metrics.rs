//! Metrics module for quota-service.
//! Provides Prometheus metrics for admission decisions and credit consumption.

use prometheus::{opts, register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};
use std::sync::OnceLock;

/// Admission decisions by service and outcome
pub static ADMISSION_DECISIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Usage records appended by service
pub static USAGE_RECORDS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Credits debited by service
pub static CREDITS_CONSUMED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Accounting faults for alerting
pub static ACCOUNTING_ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Safe to call more than once.
pub fn init_metrics() {
    ADMISSION_DECISIONS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "quota_admission_decisions_total",
                "Admission decisions by service and outcome"
            ),
            &["service", "outcome"]
        )
        .expect("Failed to register ADMISSION_DECISIONS_TOTAL")
    });

    USAGE_RECORDS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("quota_usage_records_total", "Usage records appended by service"),
            &["service"]
        )
        .expect("Failed to register USAGE_RECORDS_TOTAL")
    });

    CREDITS_CONSUMED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("quota_credits_consumed_total", "Credits debited by service"),
            &["service"]
        )
        .expect("Failed to register CREDITS_CONSUMED_TOTAL")
    });

    ACCOUNTING_ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "quota_accounting_errors_total",
                "Accounting errors by type for alerting"
            ),
            &["error_type"]
        )
        .expect("Failed to register ACCOUNTING_ERRORS_TOTAL")
    });
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an admission decision.
pub fn record_admission(service: &str, allowed: bool) {
    if let Some(counter) = ADMISSION_DECISIONS_TOTAL.get() {
        let outcome = if allowed { "allowed" } else { "denied" };
        counter.with_label_values(&[service, outcome]).inc();
    }
}

/// Record a usage append.
pub fn record_usage(service: &str, amount: i64) {
    if let Some(counter) = USAGE_RECORDS_TOTAL.get() {
        counter.with_label_values(&[service]).inc();
    }
    if let Some(counter) = CREDITS_CONSUMED_TOTAL.get() {
        counter
            .with_label_values(&[service])
            .inc_by(amount.max(0) as u64);
    }
}

/// Record an accounting error for alerting.
pub fn record_accounting_error(error_type: &str) {
    if let Some(counter) = ACCOUNTING_ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type]).inc();
    }
}
