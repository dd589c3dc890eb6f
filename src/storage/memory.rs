//! In-memory archive backend.
//!
//! Objects are held in a `tokio::sync::RwLock<HashMap<bucket, BTreeMap<key, ...>>>`
//! so listings come back in key order, like S3.  Listing pages are capped at
//! `page_size` entries (prefixes and objects both count), which lets tests
//! exercise multi-page listings without thousands of keys.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use super::backend::{ArchiveStore, ListPage, ObjectBody, ObjectEntry, StoreError};

/// Default page size, matching the S3 `max-keys` default.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

/// In-memory archive.
pub struct MemoryArchive {
    /// bucket -> key -> object.
    buckets: tokio::sync::RwLock<HashMap<String, BTreeMap<String, MemoryObject>>>,
    /// Keys that answer every read with `AccessDenied`.
    denied: tokio::sync::RwLock<HashSet<(String, String)>>,
    /// Maximum entries per listing page.
    page_size: usize,
}

impl Default for MemoryArchive {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl MemoryArchive {
    /// Create an empty archive whose listings return at most `page_size`
    /// entries per page.
    pub fn new(page_size: usize) -> Self {
        Self {
            buckets: tokio::sync::RwLock::new(HashMap::new()),
            denied: tokio::sync::RwLock::new(HashSet::new()),
            page_size: page_size.max(1),
        }
    }

    /// Store `data` at `bucket`/`key`, stamped with the current time.
    pub async fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        self.insert_at(bucket, key, data, Utc::now()).await;
    }

    /// Store `data` at `bucket`/`key` with an explicit modification time.
    pub async fn insert_at(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        last_modified: DateTime<Utc>,
    ) {
        let mut buckets = self.buckets.write().await;
        buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            MemoryObject {
                data: data.into(),
                last_modified,
            },
        );
    }

    /// Make reads of `bucket`/`key` fail with `AccessDenied`.
    pub async fn deny(&self, bucket: &str, key: &str) {
        self.denied
            .write()
            .await
            .insert((bucket.to_string(), key.to_string()));
    }
}

/// Build one listing page from keys in order.
///
/// `continuation` is the last name emitted by the previous page.  When that
/// name is a common prefix, every key under it is skipped too.
fn list_sorted(
    objects: &BTreeMap<String, MemoryObject>,
    prefix: &str,
    delimiter: &str,
    continuation: Option<&str>,
    page_size: usize,
) -> ListPage {
    let mut page = ListPage::default();
    let mut emitted = 0usize;
    let mut last_name: Option<String> = None;

    for (key, obj) in objects.range(prefix.to_string()..) {
        if !key.starts_with(prefix) {
            break;
        }
        if let Some(token) = continuation {
            let under_token_prefix =
                !delimiter.is_empty() && token.ends_with(delimiter) && key.starts_with(token);
            if key.as_str() <= token || under_token_prefix {
                continue;
            }
        }

        let rest = &key[prefix.len()..];
        let split = if delimiter.is_empty() {
            None
        } else {
            rest.find(delimiter)
        };

        match split {
            Some(pos) => {
                let cp = format!("{}{}{}", prefix, &rest[..pos], delimiter);
                if page.prefixes.last() == Some(&cp) {
                    continue;
                }
                if emitted == page_size {
                    page.next_continuation = last_name;
                    return page;
                }
                last_name = Some(cp.clone());
                page.prefixes.push(cp);
            }
            None => {
                if emitted == page_size {
                    page.next_continuation = last_name;
                    return page;
                }
                last_name = Some(key.clone());
                page.objects.push(ObjectEntry {
                    key: key.clone(),
                    size: obj.data.len() as u64,
                    last_modified: obj.last_modified,
                });
            }
        }
        emitted += 1;
    }

    page
}

impl ArchiveStore for MemoryArchive {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
        continuation: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<ListPage, StoreError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        let delimiter = delimiter.to_string();
        let continuation = continuation.map(|s| s.to_string());
        Box::pin(async move {
            let buckets = self.buckets.read().await;
            let objects = buckets
                .get(&bucket)
                .ok_or_else(|| StoreError::not_found(&bucket, &prefix))?;
            Ok(list_sorted(
                objects,
                &prefix,
                &delimiter,
                continuation.as_deref(),
                self.page_size,
            ))
        })
    }

    fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectBody, StoreError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            if self
                .denied
                .read()
                .await
                .contains(&(bucket.clone(), key.clone()))
            {
                return Err(StoreError::AccessDenied { bucket, key });
            }

            let buckets = self.buckets.read().await;
            let obj = buckets
                .get(&bucket)
                .and_then(|b| b.get(&key))
                .cloned()
                .ok_or_else(|| StoreError::not_found(&bucket, &key))?;

            Ok(ObjectBody {
                content_length: Some(obj.data.len() as u64),
                last_modified: Some(obj.last_modified),
                chunks: futures_util::stream::once(async move { Ok(obj.data) }).boxed(),
            })
        })
    }
}
