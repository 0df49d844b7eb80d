//! Prometheus metrics for the HTTP surface and the import engine.
//!
//! HTTP traffic is measured by a middleware; the import runner reports its
//! own business counters through the helper functions below. Everything is
//! rendered by the `/metrics` endpoint in Prometheus text format.

use axum::{
    body::Body,
    extract::MatchedPath,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder.
///
/// Must run once at startup, before anything records a metric. Submissions
/// write the upload to disk inside the request, so the duration buckets
/// reach well past the typical API latency range.
pub fn init_metrics() {
    let handle = PrometheusBuilder::new()
        .set_buckets(&[0.005, 0.025, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
        .expect("Failed to set histogram buckets")
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    if PROMETHEUS_HANDLE.set(handle).is_err() {
        panic!("Prometheus handle already initialized");
    }
}

/// Handler for the `/metrics` endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            axum::http::StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            [(axum::http::header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Middleware recording `http_requests_total` (method, path, status) and
/// `http_request_duration_seconds` (method, path).
///
/// The path label uses the matched route pattern, not the raw URI, so
/// `/api/v1/imports/:job_id` stays one series instead of one per job.
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().as_str().to_owned();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(
        "http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);

    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(duration);

    response
}

/// Record rows processed by the import engine.
pub fn record_rows_processed(count: u64) {
    counter!("import_rows_processed_total").increment(count);
}

/// Record an import job reaching `completed`.
pub fn record_import_completed() {
    counter!("import_jobs_completed_total").increment(1);
}

/// Record an import job reaching `failed`.
pub fn record_import_failed() {
    counter!("import_jobs_failed_total").increment(1);
}
