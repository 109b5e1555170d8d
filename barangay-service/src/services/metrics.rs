//! Prometheus metrics for barangay-service.
//!
//! Workflow and database metrics live in the default `prometheus` registry.
//! HTTP metrics recorded by the shared middleware through the `metrics` facade
//! are rendered by the exporter handle and appended to the same scrape.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

static HTTP_METRICS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "barangay_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Workflow operations by name and outcome.
pub static WORKFLOW_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "barangay_workflow_operations_total",
        "Total number of certificate and payment workflow operations",
        &["operation", "outcome"]
    )
    .expect("Failed to register WORKFLOW_OPERATIONS")
});

/// Numbers handed out by the sequence allocator.
pub static NUMBERS_ALLOCATED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "barangay_numbers_allocated_total",
        "Total number of certificate, payment and receipt numbers allocated",
        &["kind"]
    )
    .expect("Failed to register NUMBERS_ALLOCATED")
});

/// Audit events by fate.
pub static ACTIVITY_EVENTS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "barangay_activity_events_total",
        "Total number of audit events by outcome",
        &["outcome"]
    )
    .expect("Failed to register ACTIVITY_EVENTS")
});

/// Notification emails by outcome.
pub static NOTIFICATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "barangay_notifications_total",
        "Total number of notification emails by outcome",
        &["outcome"]
    )
    .expect("Failed to register NOTIFICATIONS")
});

/// Initialize all metrics (forces lazy initialization) and install the HTTP recorder once.
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&WORKFLOW_OPERATIONS);
    Lazy::force(&NUMBERS_ALLOCATED);
    Lazy::force(&ACTIVITY_EVENTS);
    Lazy::force(&NOTIFICATIONS);

    HTTP_METRICS_HANDLE.get_or_init(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "HTTP metrics recorder not installed");
            None
        }
    });
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
    }
    let mut output = String::from_utf8_lossy(&buffer).into_owned();

    if let Some(Some(handle)) = HTTP_METRICS_HANDLE.get() {
        output.push_str(&handle.render());
    }

    output
}

/// Record a workflow operation outcome.
pub fn record_workflow_operation(operation: &str, outcome: &str) {
    WORKFLOW_OPERATIONS
        .with_label_values(&[operation, outcome])
        .inc();
}

pub fn record_number_allocated(kind: &str) {
    NUMBERS_ALLOCATED.with_label_values(&[kind]).inc();
}

pub fn record_activity_event(outcome: &str) {
    ACTIVITY_EVENTS.with_label_values(&[outcome]).inc();
}

pub fn record_notification(outcome: &str) {
    NOTIFICATIONS.with_label_values(&[outcome]).inc();
}
