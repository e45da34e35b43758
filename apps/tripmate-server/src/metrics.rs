//! Prometheus metrics for tripmate-server.
//!
//! Rendered in text format at `/metrics` on the health listener.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and return a handle for rendering.
///
/// Call once at startup, before anything is recorded.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(
        "tripmate_http_requests_total",
        "Total number of HTTP requests by route and status"
    );
    describe_histogram!(
        "tripmate_http_request_duration_seconds",
        "Duration of HTTP requests in seconds"
    );
    describe_counter!(
        "tripmate_invites_issued_total",
        "Invites handed out, by flow and whether an active invite was reused"
    );
    describe_counter!(
        "tripmate_invites_redeemed_total",
        "Invite redemption attempts by outcome"
    );
    describe_counter!(
        "tripmate_rate_limited_total",
        "Requests rejected by the rate limiter"
    );

    Ok(handle)
}

pub fn record_invite_issued(flow: &'static str, reused: bool) {
    counter!(
        "tripmate_invites_issued_total",
        "flow" => flow,
        "reused" => if reused { "true" } else { "false" }
    )
    .increment(1);
}

pub fn record_invite_redeemed(outcome: &'static str) {
    counter!("tripmate_invites_redeemed_total", "outcome" => outcome).increment(1);
}

pub fn record_rate_limited(scope: &'static str) {
    counter!("tripmate_rate_limited_total", "scope" => scope).increment(1);
}

/// Middleware recording request count and latency per matched route.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    counter!("tripmate_http_requests_total", "route" => route.clone(), "status" => status)
        .increment(1);
    histogram!("tripmate_http_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());

    response
}
