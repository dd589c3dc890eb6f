//! Prometheus metrics for the gateway.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a Tower-compatible middleware for
//! HTTP RED metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "gateway_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "gateway_http_request_duration_seconds";

/// Archive store calls (counter). Labels: operation, outcome.
pub const ARCHIVE_OPERATIONS_TOTAL: &str = "gateway_archive_operations_total";

/// Report executions (counter). Labels: report.
pub const REPORT_RUNS_TOTAL: &str = "gateway_report_runs_total";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
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
        ARCHIVE_OPERATIONS_TOTAL,
        "Archive store calls by operation and outcome"
    );
    describe_counter!(REPORT_RUNS_TOTAL, "Report executions by catalog index");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation.  Must be the outermost
/// layer so it captures the full request lifecycle.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
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

/// Fixed routes reported under their own path.
const FIXED_ROUTES: &[&str] = &[
    "/",
    "/ver",
    "/robots.txt",
    "/reports",
    "/reports/api",
    "/index.tsv",
    "/search",
    "/search/api",
    "/health",
    "/openapi.json",
    "/metrics",
];

/// Normalize an actual request path to a route template for metric labels.
///
/// Archive keys and static asset names would otherwise make the label
/// unbounded.
///
/// Examples:
/// - `/reports` -> `/reports`
/// - `/corpora/files/a.zip` -> `/corpora/{path}`
/// - `/downloads/` -> `/downloads/{path}`
/// - `/static/site.css` -> `/static/{path}`
/// - anything else -> `/{other}`
fn normalize_path(path: &str) -> String {
    if FIXED_ROUTES.contains(&path) {
        return path.to_string();
    }
    for root in ["/corpora/", "/downloads/", "/static/"] {
        if path.starts_with(root) {
            return format!("{root}{{path}}");
        }
    }
    "/{other}".to_string()
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
            StatusCode::NOT_FOUND,
            [("content-type", "text/plain; charset=utf-8")],
            "metrics disabled".to_string(),
        ),
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fixed_routes() {
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/reports/api"), "/reports/api");
        assert_eq!(normalize_path("/index.tsv"), "/index.tsv");
    }

    #[test]
    fn test_normalize_archive_paths() {
        assert_eq!(normalize_path("/corpora/"), "/corpora/{path}");
        assert_eq!(
            normalize_path("/corpora/files/CC-MAIN-2021/0001.zip"),
            "/corpora/{path}"
        );
        assert_eq!(normalize_path("/downloads/x.zip"), "/downloads/{path}");
        assert_eq!(normalize_path("/static/site.css"), "/static/{path}");
    }

    #[test]
    fn test_normalize_unknown() {
        assert_eq!(normalize_path("/wp-admin"), "/{other}");
        assert_eq!(normalize_path("/corpora"), "/{other}");
    }
}
