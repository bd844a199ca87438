//! Prometheus metrics for docbroker.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides an axum middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "docbroker_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "docbroker_http_request_duration_seconds";

/// Document operations (counter). Labels: operation, outcome.
pub const DOCUMENT_OPERATIONS_TOTAL: &str = "docbroker_document_operations_total";

/// Objects left in the bucket after their metadata was removed (counter).
pub const ORPHANED_OBJECTS_TOTAL: &str = "docbroker_orphaned_objects_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests).
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(
        DOCUMENT_OPERATIONS_TOTAL,
        "Document operations by type and outcome"
    );
    describe_counter!(
        ORPHANED_OBJECTS_TOTAL,
        "Stored objects whose deletion failed after metadata removal"
    );
}

/// Count one document operation.
pub fn record_operation(operation: &'static str, outcome: &'static str) {
    counter!(DOCUMENT_OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome)
        .increment(1);
}

/// Count one stored object left behind by a document delete.
pub fn record_orphaned_object() {
    counter!(ORPHANED_OBJECTS_TOTAL).increment(1);
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation to avoid feedback loops.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    // Do not instrument the metrics endpoint itself.
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize a request path to its route template so document ids do not
/// become label values.
///
/// Examples:
/// - `/documents/3f2a.../download` -> `/documents/{id}/download`
/// - `/api/documents/3f2a...` -> `/api/documents/{id}`
/// - anything unrouted -> `other`
fn normalize_path(path: &str) -> String {
    let (prefix, rest) = match path.strip_prefix("/api") {
        Some(rest) if rest.starts_with('/') => ("/api", rest),
        _ => ("", path),
    };

    let template = match rest {
        "/" | "/health" | "/metrics" | "/openapi.json" | "/presign-upload" | "/notify-upload"
        | "/documents" => rest.to_string(),
        _ => {
            let segments: Vec<&str> = rest.trim_start_matches('/').split('/').collect();
            match segments.as_slice() {
                ["documents", _] => "/documents/{id}".to_string(),
                ["documents", _, "download"] => "/documents/{id}/download".to_string(),
                _ => return "other".to_string(),
            }
        }
    };
    format!("{prefix}{template}")
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> impl IntoResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain; version=0.0.4")],
            "metrics recorder not installed\n".to_string(),
        ),
    }
}

// -- Tests --------------------------------------------------------------------
