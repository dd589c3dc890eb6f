//! Corpora gateway library.
//!
//! This crate serves a file archive kept in an S3-compatible object store,
//! together with its download-tracking database, over HTTP: directory
//! listings and an object proxy for the archive, canned SQL reports, and
//! TSV/JSON exports of the `downloadable` table.

use std::sync::Arc;

pub mod config;
pub mod content_type;
pub mod credentials;
pub mod db;
pub mod errors;
pub mod export;
pub mod gateway;
pub mod html;
pub mod metrics;
pub mod reports;
pub mod server;
pub mod storage;

use crate::config::Config;
use crate::credentials::CredentialProvider;
use crate::storage::backend::ArchiveStore;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Gateway configuration.
    pub config: Config,
    /// Archive store client (AWS, local directory, or in-memory).
    pub archive: Arc<dyn ArchiveStore>,
    /// Init-once provider of the read-only database credential.
    pub credentials: Arc<CredentialProvider>,
}
