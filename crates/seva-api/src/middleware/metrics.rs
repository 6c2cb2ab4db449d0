//! # Prometheus Metrics
//!
//! Request and workflow metrics emitted through the `metrics` facade and
//! rendered by `metrics-exporter-prometheus` at `/metrics`.
//!
//! ## Counters
//! - `seva_http_requests_total` by method, route, status
//! - `seva_order_transitions_total` by action, outcome
//! - `seva_wallet_transactions_total` by kind
//!
//! ## Histograms
//! - `seva_http_request_duration_seconds` by method, route, status

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder. Call once at startup.
pub fn install_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("failed to install metrics recorder: {e}"))
}

/// Middleware that records request count and latency. The route label is
/// the matched route template, so ids never become label values.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    let labels = [
        ("method", method),
        ("route", route),
        ("status", response.status().as_u16().to_string()),
    ];
    counter!("seva_http_requests_total", &labels).increment(1);
    histogram!("seva_http_request_duration_seconds", &labels)
        .record(started.elapsed().as_secs_f64());

    response
}

/// Count one attempted order transition. `outcome` is `"ok"` or an error
/// kind such as `"STATE_CONFLICT"`.
pub fn record_transition(action: &str, outcome: &str) {
    counter!(
        "seva_order_transitions_total",
        "action" => action.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

pub fn record_wallet_transaction(kind: &str) {
    counter!("seva_wallet_transactions_total", "kind" => kind.to_string()).increment(1);
}
