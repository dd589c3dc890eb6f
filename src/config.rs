//! Configuration loading and types for the corpora gateway.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  Every section is optional; missing sections take
//! the defaults below.

use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Object-store archive settings.
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Metadata database credential lookup.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Row limits for the TSV/JSON exports.
    #[serde(default)]
    pub export: ExportConfig,

    /// Observability settings (metrics + health probes).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory served under `/static`.
    #[serde(default = "default_static_dir")]
    pub static_dir: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Enable the `/health` probe.
    #[serde(default = "default_true")]
    pub health_check: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics: true,
            health_check: true,
        }
    }
}

/// Archive (object store) configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Backend type: `aws`, `local`, or `memory`.
    #[serde(default = "default_archive_backend")]
    pub backend: String,

    /// Bucket holding the archive.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Public base URL that file links point at in bypass mode.
    #[serde(default = "default_bypass_url")]
    pub bypass_url: String,

    /// Link files straight to `bypass_url` instead of proxying them.
    #[serde(default = "default_true")]
    pub use_bypass: bool,

    /// AWS S3 settings.
    #[serde(default)]
    pub aws: AwsArchiveConfig,

    /// Local directory settings.
    #[serde(default)]
    pub local: LocalArchiveConfig,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            backend: default_archive_backend(),
            bucket: default_bucket(),
            bypass_url: default_bypass_url(),
            use_bypass: true,
            aws: AwsArchiveConfig::default(),
            local: LocalArchiveConfig::default(),
        }
    }
}

/// AWS S3 archive configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AwsArchiveConfig {
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: String,
    /// Force path-style URL addressing.
    #[serde(default)]
    pub use_path_style: bool,
    /// Explicit AWS access key (falls back to env/credential chain).
    #[serde(default)]
    pub access_key_id: String,
    /// Explicit AWS secret key (falls back to env/credential chain).
    #[serde(default)]
    pub secret_access_key: String,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Total attempts per SDK call, retries included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for AwsArchiveConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint_url: String::new(),
            use_path_style: false,
            access_key_id: String::new(),
            secret_access_key: String::new(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Local directory archive configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalArchiveConfig {
    /// Root directory; each bucket is a subdirectory.
    #[serde(default = "default_archive_root")]
    pub root_dir: String,
}

impl Default for LocalArchiveConfig {
    fn default() -> Self {
        Self {
            root_dir: default_archive_root(),
        }
    }
}

/// Where the read-only database credential comes from.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Credentials file holding the reader section.
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,

    /// Section of the credentials file to read.
    #[serde(default = "default_credentials_section")]
    pub section: String,

    /// When this environment variable is set, `alternate_file` replaces the
    /// file name of `credentials_file`.
    #[serde(default = "default_alternate_env")]
    pub alternate_env: String,

    /// Alternate credentials file name.
    #[serde(default = "default_alternate_file")]
    pub alternate_file: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_file(),
            section: default_credentials_section(),
            alternate_env: default_alternate_env(),
            alternate_file: default_alternate_file(),
        }
    }
}

/// Row limits for `/index.tsv` and `/search/api`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Rows returned by `/index.tsv` when `row_count` is absent or invalid.
    #[serde(default = "default_index_row_count")]
    pub index_row_count: u64,

    /// Rows returned by `/search/api` when `row_count` is absent or invalid.
    #[serde(default = "default_search_row_count")]
    pub search_row_count: u64,

    /// Hard cap applied to any client-supplied `row_count`.
    #[serde(default = "default_index_row_count")]
    pub max_row_count: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            index_row_count: default_index_row_count(),
            search_row_count: default_search_row_count(),
            max_row_count: default_index_row_count(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> String {
    "./static".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_archive_backend() -> String {
    "aws".to_string()
}

fn default_bucket() -> String {
    "digitalcorpora".to_string()
}

fn default_bypass_url() -> String {
    "https://digitalcorpora.s3.amazonaws.com/".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_read_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_archive_root() -> String {
    "./data/archive".to_string()
}

fn default_credentials_file() -> String {
    "etc/credentials.yaml".to_string()
}

fn default_credentials_section() -> String {
    "dbreader".to_string()
}

fn default_alternate_env() -> String {
    "AWS".to_string()
}

fn default_alternate_file() -> String {
    "aws_creds.yaml".to_string()
}

fn default_index_row_count() -> u64 {
    1_000_000
}

fn default_search_row_count() -> u64 {
    1000
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_config(&contents)
}

/// Parse configuration from YAML text.  An empty document yields defaults.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.archive.bucket, "digitalcorpora");
        assert!(config.archive.use_bypass);
        assert_eq!(config.export.search_row_count, 1000);
        assert_eq!(config.export.index_row_count, 1_000_000);
        assert_eq!(config.database.section, "dbreader");
    }

    #[test]
    fn test_partial_sections() {
        let yaml = r#"
server:
  port: 9000
archive:
  backend: local
  use_bypass: false
  local:
    root_dir: /srv/archive
export:
  max_row_count: 5000
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.archive.backend, "local");
        assert!(!config.archive.use_bypass);
        assert_eq!(config.archive.local.root_dir, "/srv/archive");
        assert_eq!(config.archive.aws.max_attempts, 3);
        assert_eq!(config.export.max_row_count, 5000);
        assert_eq!(config.export.search_row_count, 1000);
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(parse_config("server: [").is_err());
    }

    #[test]
    fn test_sample_config_parses() {
        let config = load_config(concat!(env!("CARGO_MANIFEST_DIR"), "/corpora-gateway.yaml")).unwrap();
        assert_eq!(config.archive.bucket, "digitalcorpora");
        assert_eq!(config.database.alternate_file, "aws_creds.yaml");
    }
}
