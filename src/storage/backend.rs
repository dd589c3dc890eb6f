//! Abstract archive store trait.
//!
//! Every object-store client must implement [`ArchiveStore`].  The trait
//! exposes only what the gateway needs from the archive: one page of a
//! delimiter listing and a streamed object read.  Client-specific failures
//! are folded into [`StoreError`] at this boundary so callers match on the
//! kind, never on SDK error classes.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Failure kinds reported by an archive store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object (or bucket) exists under the requested name.
    #[error("not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// The store refused the request.
    #[error("access denied: s3://{bucket}/{key}")]
    AccessDenied { bucket: String, key: String },

    /// Timeouts, throttling, dispatch failures and 5xx replies.
    #[error("transient archive failure during {operation}: {message}")]
    Transient { operation: String, message: String },

    /// Anything else the client reported.
    #[error("archive {operation} failed: {message}")]
    Other { operation: String, message: String },
}

impl StoreError {
    /// Short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::AccessDenied { .. } => "access_denied",
            StoreError::Transient { .. } => "transient",
            StoreError::Other { .. } => "other",
        }
    }

    pub fn not_found(bucket: &str, key: &str) -> Self {
        StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

/// One object as reported by a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEntry {
    /// Full object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
}

/// One page of a delimiter listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Common prefixes, each ending with the delimiter.
    pub prefixes: Vec<String>,
    /// Objects directly under the prefix.
    pub objects: Vec<ObjectEntry>,
    /// Token for the next page, `None` on the last page.
    pub next_continuation: Option<String>,
}

/// Stream of body chunks exactly as the store returns them.
pub type ByteChunks = BoxStream<'static, Result<Bytes, StoreError>>;

/// An object body plus the metadata the store reported with it.
pub struct ObjectBody {
    /// Content length, when known.
    pub content_length: Option<u64>,
    /// Last modification time, when known.
    pub last_modified: Option<DateTime<Utc>>,
    /// Raw body chunks.
    pub chunks: ByteChunks,
}

impl std::fmt::Debug for ObjectBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectBody")
            .field("content_length", &self.content_length)
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

/// Async read-only archive contract.
pub trait ArchiveStore: Send + Sync + 'static {
    /// Fetch one page of the listing of `prefix` in `bucket`, grouping keys
    /// on `delimiter`.  `continuation` is the token returned by the previous
    /// page, if any.
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
        continuation: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<ListPage, StoreError>> + Send + '_>>;

    /// Open the object at `key` in `bucket` for streaming.
    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectBody, StoreError>> + Send + '_>>;
}
