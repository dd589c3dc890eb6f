//! Axum router construction and route handlers.
//!
//! The [`app`] function wires every gateway endpoint to its handler and
//! returns a ready-to-serve [`axum::Router`].  Archive routes go through the
//! object proxy; report and export routes run on the blocking pool against
//! a fresh read-only database connection.

use axum::{
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, Request, StatusCode, Uri},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;
use tower::Layer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;
use utoipa::OpenApi;

use crate::errors::{generate_request_id, GatewayError};
use crate::export::{self, Window};
use crate::gateway::{self, ListingLinks};
use crate::html::HtmlWriter;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::reports::{self, ReportResult};
use crate::AppState;

// -- OpenAPI document -----------------------------------------------------------

/// OpenAPI documentation for the machine-readable endpoints.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Corpora Gateway API",
        version = "0.1.0",
        description = "Archive exports and canned reports"
    ),
    paths(health_check, reports_api, index_tsv, search_api),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Reports", description = "Canned SQL reports"),
        (name = "Export", description = "Exports of the downloadable table"),
    )
)]
struct ApiDoc;

/// Build the axum [`Router`] with every gateway route.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let static_files = SetResponseHeaderLayer::overriding(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=5"),
    )
    .layer(ServeDir::new(&state.config.server.static_dir));

    let mut router = Router::new()
        .route("/", get(index_page))
        .route("/ver", get(version))
        .route("/robots.txt", get(robots))
        .route("/corpora/", get(corpora_root))
        .route("/corpora/*path", get(corpora_path))
        .route("/downloads/", get(downloads_root))
        .route("/downloads/*path", get(downloads_path))
        .route("/reports", get(reports_page))
        .route("/reports/api", get(reports_api))
        .route("/index.tsv", get(index_tsv))
        .route("/search", get(search_page))
        .route("/search/api", get(search_api))
        .route("/openapi.json", get(openapi_json))
        .nest_service("/static", static_files);

    if state.config.observability.health_check {
        router = router.route("/health", get(health_check));
    }
    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        // Application state shared across all handlers.
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(common_headers_middleware))
        // metrics_middleware is outer (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
}

// -- Common headers middleware -----------------------------------------------

/// Adds `x-request-id` (unless an error response already set one), `Date`
/// and `Server` to every response.
async fn common_headers_middleware(req: Request<axum::body::Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    if !headers.contains_key("x-request-id") {
        if let Ok(value) = HeaderValue::from_str(&generate_request_id()) {
            headers.insert("x-request-id", value);
        }
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    if let Ok(value) = HeaderValue::from_str(&date) {
        headers.insert(header::DATE, value);
    }
    headers.insert(header::SERVER, HeaderValue::from_static("corpora-gateway"));

    response
}

// -- Request helpers ---------------------------------------------------------

/// Parse a raw query string into a map.  `+` decodes to a space, as in
/// HTML form submissions.
fn parse_query(raw: Option<String>) -> HashMap<String, String> {
    let decode = |s: &str| {
        percent_encoding::percent_decode_str(&s.replace('+', " "))
            .decode_utf8_lossy()
            .into_owned()
    };
    let mut map = HashMap::new();
    if let Some(qs) = raw {
        for part in qs.split('&').filter(|p| !p.is_empty()) {
            let (k, v) = part.split_once('=').unwrap_or((part, ""));
            map.insert(decode(k), decode(v));
        }
    }
    map
}

/// Absolute URL of the current request, as the client addressed it.
fn request_url(headers: &HeaderMap, uri: &Uri) -> String {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let scheme = header_str("x-forwarded-proto").unwrap_or("http");
    let host = header_str("host").unwrap_or("localhost");
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("{scheme}://{host}{path}")
}

// -- Health check -------------------------------------------------------------

/// `GET /health` -- Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    operation_id = "HealthCheck",
    responses(
        (status = 200, description = "Health check OK")
    )
)]
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        r#"{"status":"ok"}"#,
    )
}

/// `GET /openapi.json`
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// -- Pages --------------------------------------------------------------------

/// `GET /` -- Landing page.
async fn index_page(headers: HeaderMap) -> Html<String> {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");

    let mut w = HtmlWriter::new();
    w.open("html");
    w.open("head");
    w.text_element("title", "ROOT");
    w.close("head");
    w.open("body");
    w.text_element("h1", host);
    w.open("ul");
    w.newline();
    for (href, label) in [
        ("/corpora/", "Corpora"),
        ("/downloads/", "Downloads"),
        ("/reports", "Reports"),
        ("/search", "Search"),
        ("/index.tsv", "Index (TSV)"),
    ] {
        w.open("li");
        w.link(href, label);
        w.close("li");
        w.newline();
    }
    w.close("ul");
    w.close("body");
    w.close("html");
    Html(w.finish())
}

/// `GET /ver` -- Version report.
async fn version() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!(
            "{} {}\n",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ),
    )
}

/// `GET /search` -- Search form driving `/search/api`.
async fn search_page() -> Html<String> {
    let mut w = HtmlWriter::new();
    w.open("html");
    w.open("head");
    w.text_element("title", "Search");
    w.close("head");
    w.open("body");
    w.text_element("h1", "Search the archive");
    w.open_with("form", &[("action", "/search/api"), ("method", "get")]);
    w.empty_with("input", &[("type", "text"), ("name", "q")]);
    w.empty_with("input", &[("type", "number"), ("name", "row_count"), ("value", "1000")]);
    w.empty_with("input", &[("type", "submit"), ("value", "Search")]);
    w.close("form");
    w.close("body");
    w.close("html");
    Html(w.finish())
}

// -- Archive routes -----------------------------------------------------------

/// Serve `key` from the archive bucket: object, listing, or 404.
async fn proxy_key(
    state: &AppState,
    key: String,
    headers: &HeaderMap,
    uri: &Uri,
) -> Result<Response, GatewayError> {
    let archive = &state.config.archive;
    let fetched = gateway::fetch(state.archive.as_ref(), &archive.bucket, &key).await?;
    let bypass = archive.use_bypass.then(|| archive.bypass_url.clone());
    let links = ListingLinks::new(&request_url(headers, uri), bypass);
    Ok(fetched.into_response_with(&links))
}

/// `GET /robots.txt`
async fn robots(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, GatewayError> {
    proxy_key(&state, "robots.txt".to_string(), &headers, &uri).await
}

/// `GET /corpora/`
async fn corpora_root(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, GatewayError> {
    proxy_key(&state, "corpora/".to_string(), &headers, &uri).await
}

/// `GET /corpora/{path}`
async fn corpora_path(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, GatewayError> {
    proxy_key(&state, format!("corpora/{path}"), &headers, &uri).await
}

/// `GET /downloads/`
async fn downloads_root(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, GatewayError> {
    proxy_key(&state, "downloads/".to_string(), &headers, &uri).await
}

/// `GET /downloads/{path}`
async fn downloads_path(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, GatewayError> {
    proxy_key(&state, format!("downloads/{path}"), &headers, &uri).await
}

// -- Reports ------------------------------------------------------------------

/// Report index from the `report` query parameter.  Anything that is not an
/// integer counts as absent; integers outside the catalog are rejected,
/// including ones too large for an `i64`.
fn selected_report(params: &HashMap<String, String>) -> Result<Option<usize>, GatewayError> {
    let Some(index) = params.get("report").and_then(|v| parse_report_index(v.trim())) else {
        return Ok(None);
    };
    let count = reports::count();
    match usize::try_from(index) {
        Ok(index) if index < count => Ok(Some(index)),
        _ => Err(GatewayError::InvalidReport { index, count }),
    }
}

/// Parse a signed decimal, saturating when the digits overflow `i64`.
fn parse_report_index(raw: &str) -> Option<i64> {
    if let Ok(n) = raw.parse::<i64>() {
        return Some(n);
    }
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(if negative { i64::MIN } else { i64::MAX })
}

async fn run_report(state: &AppState, index: usize) -> Result<ReportResult, GatewayError> {
    let db = state.credentials.database()?;
    db.run(move |db| reports::run(db, index, &[])).await
}

/// `GET /reports` -- Report catalog, plus the selected report's table.
async fn reports_page(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> Result<Html<String>, GatewayError> {
    let params = parse_query(raw);
    let html = match selected_report(&params)? {
        Some(index) => {
            let mut result = run_report(&state, index).await?;
            let column = reports::link_s3keys(&mut result);
            reports::render_reports_page(Some((&result, column)))
        }
        None => reports::render_reports_page(None),
    };
    Ok(Html(html))
}

/// `GET /reports/api?report=n` -- One report as JSON.
#[utoipa::path(
    get,
    path = "/reports/api",
    tag = "Reports",
    operation_id = "RunReport",
    params(
        ("report" = usize, Query, description = "Catalog index of the report")
    ),
    responses(
        (status = 200, description = "Report title, SQL, column names and rows"),
        (status = 400, description = "Missing or out-of-range report index")
    )
)]
async fn reports_api(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> Result<Json<ReportResult>, GatewayError> {
    let params = parse_query(raw);
    let index = selected_report(&params)?.ok_or(GatewayError::BadParameter("report"))?;
    Ok(Json(run_report(&state, index).await?))
}

// -- Exports ------------------------------------------------------------------

/// `GET /index.tsv` -- Present rows of `downloadable` as TSV.
#[utoipa::path(
    get,
    path = "/index.tsv",
    tag = "Export",
    operation_id = "ExportIndex",
    params(
        ("row_count" = Option<u64>, Query, description = "Maximum rows (default 1000000)"),
        ("offset" = Option<u64>, Query, description = "Rows to skip (default 0)")
    ),
    responses(
        (status = 200, description = "Tab-separated rows with a header line")
    )
)]
async fn index_tsv(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> Result<Response, GatewayError> {
    let params = parse_query(raw);
    let window = Window::for_index(
        &state.config.export,
        params.get("offset").map(String::as_str),
        params.get("row_count").map(String::as_str),
    );
    debug!(offset = window.offset, row_count = window.row_count, "index export");

    let db = state.credentials.database()?;
    let body = db
        .run(move |db| export::export_index(db, window).and_then(|r| export::to_tsv(&r)))
        .await?;
    Ok(([(header::CONTENT_TYPE, "text/plain")], body).into_response())
}

/// `GET /search/api` -- Present rows whose key contains `q`, as JSON.
#[utoipa::path(
    get,
    path = "/search/api",
    tag = "Export",
    operation_id = "Search",
    params(
        ("q" = Option<String>, Query, description = "Substring of the object key"),
        ("row_count" = Option<u64>, Query, description = "Maximum rows (default 1000)"),
        ("offset" = Option<u64>, Query, description = "Rows to skip (default 0)")
    ),
    responses(
        (status = 200, description = "JSON array of matching rows")
    )
)]
async fn search_api(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> Result<Response, GatewayError> {
    let params = parse_query(raw);
    let query = params.get("q").cloned().unwrap_or_default();
    let window = Window::for_search(
        &state.config.export,
        params.get("offset").map(String::as_str),
        params.get("row_count").map(String::as_str),
    );
    debug!(q = %query, offset = window.offset, row_count = window.row_count, "search");

    let db = state.credentials.database()?;
    let body = db
        .run(move |db| export::search(db, &query, window).and_then(|r| export::to_json(&r)))
        .await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
