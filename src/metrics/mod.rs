// src/metrics/mod.rs
// Prometheus metrics for the FeedPulse backend.

use axum::{http::StatusCode, response::IntoResponse};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::info;

/// Global Prometheus handle for metrics rendering.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics exporter.
pub fn init_metrics() {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    PROMETHEUS_HANDLE
        .set(handle)
        .expect("Prometheus handle already initialized");

    info!("Prometheus metrics initialized");
}

/// GET /metrics
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized".to_string()),
    }
}

/// Record an inbound HTTP request outcome.
pub fn record_http_request(route: &str, status: u16) {
    counter!("feedpulse_http_requests_total", "route" => route.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record HTTP request latency.
pub fn record_http_duration(route: &str, duration_seconds: f64) {
    histogram!("feedpulse_http_request_duration_seconds", "route" => route.to_string()).record(duration_seconds);
}

/// Record one fast-path batch's per-stage timings (C3).
pub fn record_fastpath_stage(stage: &str, duration_ms: f64) {
    histogram!("feedpulse_fastpath_stage_duration_ms", "stage" => stage.to_string()).record(duration_ms);
}

/// Record a fast-path batch's accepted item count.
pub fn record_fastpath_accepted(accepted: u64) {
    counter!("feedpulse_fastpath_accepted_total").increment(accepted);
}

/// Record one outbox dispatcher tick outcome (C4).
pub fn record_outbox_dispatch(event_type: &str, outcome: &str) {
    counter!("feedpulse_outbox_dispatch_total", "event_type" => event_type.to_string(), "outcome" => outcome)
        .increment(1);
}

/// Record one ingestion consumer delivery outcome (C5).
pub fn record_consumer_delivery(outcome: &str) {
    counter!("feedpulse_consumer_deliveries_total", "outcome" => outcome).increment(1);
}

/// Helper for timing a request; records the duration histogram on drop.
pub struct RequestTimer {
    start: Instant,
    route: String,
}

impl RequestTimer {
    pub fn new(route: &str) -> Self {
        Self { start: Instant::now(), route: route.to_string() }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_http_duration(&self.route, duration);
    }
}
