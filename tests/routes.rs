//! Router-level tests: requests go through `server::app` with an in-memory
//! archive and a temporary SQLite metadata database.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use rusqlite::{params, Connection};
use tower::ServiceExt;

use corpora_gateway::config::Config;
use corpora_gateway::credentials::{CredentialProvider, DbReaderAuth};
use corpora_gateway::storage::memory::MemoryArchive;
use corpora_gateway::AppState;

const BUCKET: &str = "digitalcorpora";

fn create_metadata_db(path: &std::path::Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "
        CREATE TABLE downloadable (
            id       INTEGER PRIMARY KEY,
            s3key    TEXT NOT NULL,
            bytes    INTEGER NOT NULL,
            mtime    TEXT NOT NULL,
            tags     TEXT,
            present  INTEGER NOT NULL DEFAULT 1
        );
        CREATE TABLE downloads (
            id         INTEGER PRIMARY KEY,
            did        INTEGER NOT NULL,
            bytes_sent INTEGER NOT NULL,
            dtime      TEXT NOT NULL
        );
        ",
    )
    .unwrap();
    let rows: &[(i64, &str, i64, i64)] = &[
        (1, "corpora/files/a.pdf", 4, 1),
        (2, "corpora/files/sub/b.zip", 2, 1),
        (3, "corpora/foo/old.zip", 9, 0),
        (4, "downloads/foo.txt", 3, 1),
        (5, "corpora/food/menu.txt", 5, 1),
    ];
    for (id, key, bytes, present) in rows {
        conn.execute(
            "INSERT INTO downloadable (id, s3key, bytes, mtime, tags, present)
             VALUES (?1, ?2, ?3, datetime('now'), NULL, ?4)",
            params![id, key, bytes, present],
        )
        .unwrap();
    }
    conn.execute(
        "INSERT INTO downloads (did, bytes_sent, dtime) VALUES (1, 4, datetime('now', '-1 hours'))",
        [],
    )
    .unwrap();
}

struct Harness {
    _dir: tempfile::TempDir,
    app: Router,
}

async fn harness_with(dir: tempfile::TempDir, credentials: CredentialProvider) -> Harness {
    let static_dir = dir.path().join("static");
    std::fs::create_dir(&static_dir).unwrap();
    std::fs::write(static_dir.join("site.css"), "body {}").unwrap();

    let archive = MemoryArchive::default();
    archive.insert(BUCKET, "robots.txt", "User-agent: *\nDisallow: /\n").await;
    archive.insert(BUCKET, "corpora/files/a.pdf", "%PDF").await;
    archive.insert(BUCKET, "corpora/files/sub/b.zip", "PK").await;
    archive.insert(BUCKET, "downloads/foo.txt", "foo").await;

    let mut config = Config::default();
    config.archive.bucket = BUCKET.to_string();
    config.server.static_dir = static_dir.to_string_lossy().into_owned();

    let state = Arc::new(AppState {
        config,
        archive: Arc::new(archive),
        credentials: Arc::new(credentials),
    });
    Harness {
        _dir: dir,
        app: corpora_gateway::server::app(state),
    }
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("metadata.db");
    create_metadata_db(&db_path);
    let credentials = CredentialProvider::fixed(DbReaderAuth {
        database: db_path.to_string_lossy().into_owned(),
        busy_timeout_ms: 1000,
    });
    harness_with(dir, credentials).await
}

async fn get(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(header::HOST, "gw.test")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_object_is_proxied_with_content_type() {
    let h = harness().await;
    let response = get(&h.app, "/corpora/files/a.pdf").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(response.headers()[header::SERVER], "corpora-gateway");
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(body_string(response).await, "%PDF");
}

#[tokio::test]
async fn test_robots_txt() {
    let h = harness().await;
    let response = get(&h.app, "/robots.txt").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(body_string(response).await, "User-agent: *\nDisallow: /\n");
}

#[tokio::test]
async fn test_prefix_listing() {
    let h = harness().await;
    let response = get(&h.app, "/corpora/files/").await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("<h1>corpora/files/</h1>"));
    assert!(html.contains("<a href=\"http://gw.test/corpora/files/sub/\">sub/</a>"));
    assert!(html.contains(
        "<a href=\"https://digitalcorpora.s3.amazonaws.com/corpora/files/a.pdf\">a.pdf</a>"
    ));
}

#[tokio::test]
async fn test_key_without_slash_falls_back_to_listing() {
    let h = harness().await;
    let response = get(&h.app, "/corpora/files").await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("<a href=\"http://gw.test/corpora/files/sub/\">sub/</a>"));
}

#[tokio::test]
async fn test_missing_key_is_404() {
    let h = harness().await;
    let response = get(&h.app, "/corpora/missing.zip").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_string(response).await,
        "Error 404: File not found -- s3://digitalcorpora/corpora/missing.zip"
    );
}

#[tokio::test]
async fn test_empty_prefix_page() {
    let h = harness().await;
    let response = get(&h.app, "/downloads/nothing/").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_string(response).await,
        "<html><body>downloads/nothing/: not found</body></html>"
    );
}

#[tokio::test]
async fn test_reports_index_and_result() {
    let h = harness().await;

    let response = get(&h.app, "/reports").await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("?report=0"));
    assert!(!html.contains("<table>"));

    let response = get(&h.app, "/reports?report=0").await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("<a href=\"/corpora/files/a.pdf\">corpora/files/a.pdf</a>"));
    assert!(!html.contains("corpora/foo/old.zip"));

    let response = get(&h.app, "/reports?report=abc").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_report_index_out_of_range() {
    let h = harness().await;
    let response = get(&h.app, "/reports?report=99").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let response = get(&h.app, "/reports/api?report=99").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let response = get(&h.app, "/reports/api").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let response = get(&h.app, "/reports?report=99999999999999999999").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reports_api_returns_raw_result() {
    let h = harness().await;
    let response = get(&h.app, "/reports/api?report=5").await;
    assert_eq!(response.status(), StatusCode::OK);
    let value: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(value["title"], "Downloads in the past 24 hours");
    assert_eq!(value["column_names"], serde_json::json!(["s3key", "count"]));
    assert_eq!(value["rows"][0][0], "corpora/files/a.pdf");
}

#[tokio::test]
async fn test_index_tsv_window() {
    let h = harness().await;
    let response = get(&h.app, "/index.tsv?row_count=2&offset=0").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    let body = body_string(response).await;
    let lines: Vec<&str> = body.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "id\ts3key\tbytes\tmtime\ttags\tpresent");
    assert!(lines[1].starts_with("1\tcorpora/files/a.pdf\t4\t"));
}

#[tokio::test]
async fn test_search_api_garbage_row_count() {
    let h = harness().await;
    let response = get(&h.app, "/search/api?q=foo&row_count=lots").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let body = body_string(response).await;
    assert!(body.starts_with("[\n    {\n        \"bytes\""));
    let rows: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
    let keys: Vec<&str> = rows.iter().map(|r| r["s3key"].as_str().unwrap()).collect();
    assert_eq!(keys, vec!["corpora/food/menu.txt", "downloads/foo.txt"]);
}

#[tokio::test]
async fn test_database_routes_fail_without_credentials() {
    let h = harness_with(
        tempfile::tempdir().unwrap(),
        CredentialProvider::new("/nonexistent/credentials.yaml", "dbreader"),
    )
    .await;
    let response = get(&h.app, "/index.tsv").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    // The catalog itself does not need the database.
    let response = get(&h.app, "/reports").await;
    assert_eq!(response.status(), StatusCode::OK);

    // Nor does the archive.
    let response = get(&h.app, "/downloads/foo.txt").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_static_assets_are_cacheable() {
    let h = harness().await;
    let response = get(&h.app, "/static/site.css").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=5");
    assert_eq!(body_string(response).await, "body {}");
}

#[tokio::test]
async fn test_health_version_and_openapi() {
    let h = harness().await;

    let response = get(&h.app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, r#"{"status":"ok"}"#);

    let response = get(&h.app, "/ver").await;
    assert!(body_string(response).await.starts_with("corpora-gateway "));

    let response = get(&h.app, "/openapi.json").await;
    let doc: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(doc["paths"]["/search/api"].is_object());
}
