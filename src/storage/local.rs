//! Local filesystem archive backend.
//!
//! Serves a directory tree as the archive: `{root}/{bucket}/{key}`.
//! Directories play the role of common prefixes.  Listings return a single
//! page sorted by name.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use tracing::debug;

use super::backend::{ArchiveStore, ListPage, ObjectBody, ObjectEntry, StoreError};

/// Serves objects from the local filesystem.
pub struct LocalArchive {
    /// Root directory; each bucket is a subdirectory.
    root: PathBuf,
}

impl LocalArchive {
    /// Create a new `LocalArchive` rooted at `root`.  The directory must exist.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            anyhow::bail!("archive root {} is not a directory", root.display());
        }
        Ok(Self { root })
    }

    /// Resolve a bucket-relative name to a path under the root, rejecting
    /// any `..` component.
    fn resolve(&self, bucket: &str, name: &str) -> Result<PathBuf, StoreError> {
        for part in [bucket, name] {
            for component in Path::new(part).components() {
                if matches!(component, Component::ParentDir | Component::RootDir) {
                    return Err(StoreError::AccessDenied {
                        bucket: bucket.to_string(),
                        key: name.to_string(),
                    });
                }
            }
        }
        Ok(self.root.join(bucket).join(name))
    }

    fn io_error(operation: &str, bucket: &str, key: &str, err: std::io::Error) -> StoreError {
        match err.kind() {
            std::io::ErrorKind::NotFound => StoreError::not_found(bucket, key),
            std::io::ErrorKind::PermissionDenied => StoreError::AccessDenied {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            _ => StoreError::Other {
                operation: operation.to_string(),
                message: err.to_string(),
            },
        }
    }

    fn list_dir(&self, bucket: &str, prefix: &str) -> Result<ListPage, StoreError> {
        // "corpora/fi" lists directory "corpora/" filtered on names starting with "fi".
        let (dir_part, name_part) = match prefix.rfind('/') {
            Some(pos) => (&prefix[..=pos], &prefix[pos + 1..]),
            None => ("", prefix),
        };
        let dir = self.resolve(bucket, dir_part)?;

        let read = match std::fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ListPage::default());
            }
            Err(e) => return Err(Self::io_error("list", bucket, prefix, e)),
        };

        let mut entries: Vec<(String, std::fs::Metadata)> = Vec::new();
        for entry in read {
            let entry = entry.map_err(|e| Self::io_error("list", bucket, prefix, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(name_part) {
                continue;
            }
            let meta = entry
                .metadata()
                .map_err(|e| Self::io_error("list", bucket, prefix, e))?;
            entries.push((name, meta));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut page = ListPage::default();
        for (name, meta) in entries {
            if meta.is_dir() {
                page.prefixes.push(format!("{dir_part}{name}/"));
            } else {
                let last_modified = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or(DateTime::UNIX_EPOCH);
                page.objects.push(ObjectEntry {
                    key: format!("{dir_part}{name}"),
                    size: meta.len(),
                    last_modified,
                });
            }
        }
        Ok(page)
    }
}

impl ArchiveStore for LocalArchive {
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        _delimiter: &str,
        _continuation: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<ListPage, StoreError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        Box::pin(async move {
            debug!("local list: bucket={} prefix={}", bucket, prefix);
            self.list_dir(&bucket, &prefix)
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
            debug!("local get: bucket={} key={}", bucket, key);
            let path = self.resolve(&bucket, &key)?;
            let meta = tokio::fs::metadata(&path)
                .await
                .map_err(|e| Self::io_error("get_object", &bucket, &key, e))?;
            if !meta.is_file() {
                return Err(StoreError::not_found(&bucket, &key));
            }
            let data = tokio::fs::read(&path)
                .await
                .map_err(|e| Self::io_error("get_object", &bucket, &key, e))?;
            let data = Bytes::from(data);

            Ok(ObjectBody {
                content_length: Some(meta.len()),
                last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                chunks: futures_util::stream::once(async move { Ok(data) }).boxed(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    fn archive_with_files() -> (tempfile::TempDir, LocalArchive) {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("bucket").join("corpora");
        std::fs::create_dir_all(base.join("files")).unwrap();
        std::fs::write(base.join("readme.txt"), b"hello").unwrap();
        std::fs::write(base.join("files").join("a.pdf"), b"%PDF").unwrap();
        let archive = LocalArchive::new(dir.path()).unwrap();
        (dir, archive)
    }

    #[tokio::test]
    async fn test_list_directory() {
        let (_dir, archive) = archive_with_files();
        let page = archive
            .list_page("bucket", "corpora/", "/", None)
            .await
            .unwrap();
        assert_eq!(page.prefixes, vec!["corpora/files/"]);
        assert_eq!(page.objects.len(), 1);
        assert_eq!(page.objects[0].key, "corpora/readme.txt");
        assert_eq!(page.objects[0].size, 5);
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_empty() {
        let (_dir, archive) = archive_with_files();
        let page = archive
            .list_page("bucket", "nothing/", "/", None)
            .await
            .unwrap();
        assert!(page.prefixes.is_empty() && page.objects.is_empty());
    }

    #[tokio::test]
    async fn test_get_file() {
        let (_dir, archive) = archive_with_files();
        let body = archive
            .get_object("bucket", "corpora/files/a.pdf")
            .await
            .unwrap();
        let chunks: Vec<Bytes> = body.chunks.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"%PDF".to_vec());
    }

    #[tokio::test]
    async fn test_get_directory_is_not_found() {
        let (_dir, archive) = archive_with_files();
        let err = archive.get_object("bucket", "corpora/files").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_dir, archive) = archive_with_files();
        let err = archive
            .get_object("bucket", "../bucket/corpora/readme.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AccessDenied { .. }));
    }
}
