//! Object proxy with prefix fallback.
//!
//! A key ending in `/` is listed.  Any other key is read as an object; when
//! the store says the object is missing or off limits the key is retried as
//! a prefix, and only when that listing is empty too does the caller get a
//! 404.

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use std::time::SystemTime;
use tracing::{debug, warn};

use super::listing::{list_prefix, render_listing, ListingLinks, ListingPage};
use crate::content_type::guess_content_type;
use crate::errors::GatewayError;
use crate::html::escape;
use crate::metrics::ARCHIVE_OPERATIONS_TOTAL;
use crate::storage::backend::{ArchiveStore, ObjectBody, StoreError};

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// What a key resolved to.
#[derive(Debug)]
pub enum Fetched {
    /// The object itself, with the content type guessed from its key.
    Object {
        content_type: &'static str,
        body: ObjectBody,
    },
    /// The key named a non-empty prefix.
    Listing(ListingPage),
    /// The key ended in `/` but nothing lives under it.
    EmptyPrefix(String),
}

fn record(operation: &'static str, outcome: &'static str) {
    counter!(ARCHIVE_OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
}

/// List `prefix`, mapping an empty listing to `None`.
async fn listing_or_none(
    store: &dyn ArchiveStore,
    bucket: &str,
    prefix: &str,
) -> Result<Option<ListingPage>, StoreError> {
    match list_prefix(store, bucket, prefix).await {
        Ok(listing) => {
            record("list", "ok");
            Ok(Some(listing))
        }
        Err(StoreError::NotFound { .. }) => {
            record("list", "not_found");
            Ok(None)
        }
        Err(e) => {
            record("list", e.kind());
            Err(e)
        }
    }
}

/// Resolve `key` in `bucket` to an object, a listing, or a 404.
pub async fn fetch(
    store: &dyn ArchiveStore,
    bucket: &str,
    key: &str,
) -> Result<Fetched, GatewayError> {
    debug!(bucket = %bucket, key = %key, "fetch");

    if key.ends_with('/') {
        return Ok(match listing_or_none(store, bucket, key).await? {
            Some(listing) => Fetched::Listing(listing),
            None => Fetched::EmptyPrefix(key.to_string()),
        });
    }

    let content_type = guess_content_type(key);
    match store.get_object(bucket, key).await {
        Ok(body) => {
            record("get_object", "ok");
            Ok(Fetched::Object { content_type, body })
        }
        Err(e @ (StoreError::NotFound { .. } | StoreError::AccessDenied { .. })) => {
            record("get_object", e.kind());
            debug!(bucket = %bucket, key = %key, kind = e.kind(), "object unavailable, trying prefix");
            let prefix = format!("{key}/");
            match listing_or_none(store, bucket, &prefix).await? {
                Some(listing) => Ok(Fetched::Listing(listing)),
                None => {
                    warn!(bucket = %bucket, key = %key, "neither object nor prefix");
                    Err(GatewayError::FileNotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    })
                }
            }
        }
        Err(e) => {
            record("get_object", e.kind());
            Err(e.into())
        }
    }
}

impl Fetched {
    /// Build the HTTP response; listings link relative to `links`.
    pub fn into_response_with(self, links: &ListingLinks) -> Response {
        match self {
            Fetched::Object { content_type, body } => object_response(content_type, body),
            Fetched::Listing(listing) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, HTML_CONTENT_TYPE)],
                render_listing(&listing, links),
            )
                .into_response(),
            Fetched::EmptyPrefix(key) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, HTML_CONTENT_TYPE)],
                format!("<html><body>{}: not found</body></html>", escape(&key)),
            )
                .into_response(),
        }
    }
}

fn object_response(content_type: &'static str, body: ObjectBody) -> Response {
    let mut response = Response::new(Body::from_stream(body.chunks));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    if let Some(len) = body.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    if let Some(modified) = body.last_modified {
        let value = httpdate::fmt_http_date(SystemTime::from(modified));
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }
    response
}
