//! Metrics collection and exposition.
//!
//! # Metrics
//! - `requests_received_total` (counter): every request entering the stack
//! - `responses_sent_total{status}` (counter): responses by status code
//! - `request_duration_seconds` (histogram): wall time per request
//! - `requests_admitted_total` (counter): requests passed by the rate limiter
//! - `requests_rate_limited_total` (counter): requests rejected with 429
//! - `authentications_total{outcome}` (counter): anonymous / ok / rejected
//! - `edit_conflicts_total` (counter): optimistic-lock losers
//! - `limiter_clients_evicted_total` (counter): idle entries removed by sweep

use std::net::SocketAddr;
use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Outermost request accounting: totals in, totals out by status, and wall
/// time. Runs for every request, including ones the pipeline rejects.
pub async fn track_requests(request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    counter!("requests_received_total").increment(1);

    let response = next.run(request).await;

    counter!(
        "responses_sent_total",
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    histogram!("request_duration_seconds").record(started.elapsed().as_secs_f64());
    response
}

pub fn record_request_admitted() {
    counter!("requests_admitted_total").increment(1);
}

pub fn record_rate_limited() {
    counter!("requests_rate_limited_total").increment(1);
}

/// Record an authentication outcome: "anonymous", "ok", or "rejected".
pub fn record_auth_outcome(outcome: &'static str) {
    counter!("authentications_total", "outcome" => outcome).increment(1);
}

pub fn record_edit_conflict() {
    counter!("edit_conflicts_total").increment(1);
}

pub fn record_clients_evicted(count: u64) {
    counter!("limiter_clients_evicted_total").increment(count);
}
