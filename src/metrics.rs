// src/metrics.rs
// Metrics-emission hook for the classification and routing core (spec §2, §4.8).
//
// This is the concrete shape of the "metrics-emission hook" contract named in
// spec §1(c): a thin facade over the `metrics` crate so the core never binds
// to a specific exporter. Grounded in the teacher's `metrics/mod.rs`.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder. Idempotent: a second call is a no-op.
pub fn init() {
    if PROMETHEUS_HANDLE.get().is_some() {
        return;
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder");
    if PROMETHEUS_HANDLE.set(handle).is_ok() {
        info!("metrics recorder installed");
    }
}

/// Renders the current metrics snapshot, if the recorder has been installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

pub fn record_classification(category: &str, backend: &str) {
    counter!("inquiry_classifications_total", "category" => category.to_string(), "backend" => backend.to_string())
        .increment(1);
}

pub fn record_fallback_activated(modality: &str, reason: &str) {
    counter!("inquiry_fallback_activated_total", "modality" => modality.to_string(), "reason" => reason.to_string())
        .increment(1);
    tracing::warn!(modality, reason, "fallback_activated");
}

pub fn record_routing_decision(department: &str, escalated: bool) {
    counter!(
        "inquiry_routing_decisions_total",
        "department" => department.to_string(),
        "escalated" => escalated.to_string()
    )
    .increment(1);
}

/// Drain-invocation summary counters (spec §4.8 step 5).
#[derive(Debug, Clone, Copy, Default)]
pub struct DrainSummary {
    pub fetched: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped_inflight: u64,
    pub poisoned: u64,
}

pub fn record_drain_summary(summary: DrainSummary) {
    counter!("drain_fetched_total").increment(summary.fetched);
    counter!("drain_succeeded_total").increment(summary.succeeded);
    counter!("drain_failed_total").increment(summary.failed);
    counter!("drain_skipped_inflight_total").increment(summary.skipped_inflight);
    counter!("drain_poisoned_total").increment(summary.poisoned);
}

pub fn record_inquiry_processing_duration(duration: Duration) {
    histogram!("inquiry_processing_duration_seconds").record(duration.as_secs_f64());
}
