//! Read-only database credential resolution.
//!
//! The credential lives in one section of a YAML credentials file:
//!
//! ```yaml
//! dbreader:
//!   database: /var/lib/corpora/metadata.db
//!   busy_timeout_ms: 5000
//! ```
//!
//! When the configured environment variable (default `AWS`) is present the
//! alternate file name is used instead, in the same directory.  The
//! [`CredentialProvider`] is built once at startup and shared through
//! `AppState`; the first successful lookup is kept for the life of the
//! process.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::db::ReadOnlyDb;

/// Failures while resolving the credential.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("cannot read credentials file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse credentials file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("section '{section}' missing from {path}")]
    MissingSection { section: String, path: PathBuf },
}

/// Resolved read-only credential for the metadata database.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DbReaderAuth {
    /// Path of the SQLite database file.
    pub database: String,

    /// How long a reader waits on a locked database.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

/// Pick the credentials file, honouring the alternate-file switch.
pub fn credentials_path(config: &DatabaseConfig, use_alternate: bool) -> PathBuf {
    let path = PathBuf::from(&config.credentials_file);
    if use_alternate {
        path.with_file_name(&config.alternate_file)
    } else {
        path
    }
}

/// Read `section` out of the YAML credentials file at `path`.
pub fn load_credentials(path: &Path, section: &str) -> Result<DbReaderAuth, CredentialError> {
    let contents = std::fs::read_to_string(path).map_err(|source| CredentialError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: serde_yaml::Value =
        serde_yaml::from_str(&contents).map_err(|source| CredentialError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let value = raw
        .get(section)
        .cloned()
        .ok_or_else(|| CredentialError::MissingSection {
            section: section.to_string(),
            path: path.to_path_buf(),
        })?;
    serde_yaml::from_value(value).map_err(|source| CredentialError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Init-once provider of the reader credential.
pub struct CredentialProvider {
    path: PathBuf,
    section: String,
    cached: OnceLock<DbReaderAuth>,
}

impl CredentialProvider {
    /// Provider reading `section` from `path` on first use.
    pub fn new(path: impl Into<PathBuf>, section: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            section: section.into(),
            cached: OnceLock::new(),
        }
    }

    /// Provider for the configured file, switching to the alternate file
    /// when the configured environment variable is set.
    pub fn from_config(config: &DatabaseConfig) -> Self {
        let use_alternate = std::env::var_os(&config.alternate_env).is_some();
        let path = credentials_path(config, use_alternate);
        info!(
            "Database credentials: file={} section={}",
            path.display(),
            config.section
        );
        Self::new(path, config.section.clone())
    }

    /// Provider that already holds `auth`; no file is read.
    pub fn fixed(auth: DbReaderAuth) -> Self {
        Self {
            path: PathBuf::new(),
            section: String::new(),
            cached: OnceLock::from(auth),
        }
    }

    /// Resolve the credential.
    ///
    /// With `fail_gracefully` a lookup failure yields `Ok(None)` so the
    /// caller can decide whether it can proceed without a database.
    pub fn resolve(&self, fail_gracefully: bool) -> Result<Option<DbReaderAuth>, CredentialError> {
        if let Some(auth) = self.cached.get() {
            return Ok(Some(auth.clone()));
        }
        match load_credentials(&self.path, &self.section) {
            Ok(auth) => Ok(Some(self.cached.get_or_init(|| auth).clone())),
            Err(e) if fail_gracefully => {
                warn!("Continuing without database credentials: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Connection factory for the resolved credential.  Fails if the
    /// credential cannot be resolved.
    pub fn database(&self) -> Result<ReadOnlyDb, CredentialError> {
        let auth = self.resolve(false)?.ok_or_else(|| CredentialError::MissingSection {
            section: self.section.clone(),
            path: self.path.clone(),
        })?;
        Ok(ReadOnlyDb::from_auth(&auth))
    }
}
