//! Archive storage backends.
//!
//! The [`backend::ArchiveStore`] trait abstracts over where the archive
//! physically lives.  Implementations include AWS S3 (the production
//! archive), a local directory tree, and an in-memory store.

pub mod aws;
pub mod backend;
pub mod local;
pub mod memory;

use std::sync::Arc;
use tracing::info;

use crate::config::ArchiveConfig;
use backend::ArchiveStore;

/// Build the archive store selected by `archive.backend`.
pub async fn open_archive(config: &ArchiveConfig) -> anyhow::Result<Arc<dyn ArchiveStore>> {
    let archive: Arc<dyn ArchiveStore> = match config.backend.as_str() {
        "aws" => {
            let store = aws::AwsArchive::new(&config.aws).await?;
            info!(
                "AWS archive initialized: bucket={} region={}",
                config.bucket, config.aws.region
            );
            Arc::new(store)
        }
        "local" => {
            let store = local::LocalArchive::new(&config.local.root_dir)?;
            info!("Local archive initialized at {}", config.local.root_dir);
            Arc::new(store)
        }
        "memory" => {
            info!("In-memory archive initialized (empty)");
            Arc::new(memory::MemoryArchive::default())
        }
        other => anyhow::bail!("unknown archive.backend '{}'", other),
    };
    Ok(archive)
}
