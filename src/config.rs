//! Configuration loading and types for docbroker.
//!
//! Configuration is read from an optional YAML file into [`Config`], then
//! the environment variables the deployment already uses (`S3_BUCKET_NAME`,
//! `AWS_REGION`, `PRESIGNED_URL_EXPIRATION_*`, `DEBUG`, ...) override the
//! file, and finally [`Config::validate`] checks the result. Configuration
//! is read once at startup.

use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::info;

use crate::metadata::LoadErrorPolicy;

/// Longest presign expiry the provider accepts (seven days).
pub const MAX_PRESIGN_EXPIRY_SECONDS: u64 = 604_800;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Object-storage provider settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Presigned URL settings.
    #[serde(default)]
    pub presign: PresignConfig,

    /// Metadata file settings.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
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
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Which gateway implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    /// AWS S3 or an S3-compatible endpoint.
    #[default]
    Aws,
    /// In-process gateway for local development.
    Memory,
}

/// Object-storage provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `aws` or `memory`.
    #[serde(default)]
    pub backend: StorageBackendKind,

    /// Bucket holding the documents.
    #[serde(default)]
    pub bucket: String,

    /// Provider region.
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom S3-compatible endpoint (e.g. MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Force path-style URL addressing.
    #[serde(default)]
    pub use_path_style: bool,

    /// Explicit access key (falls back to the default credential chain).
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Explicit secret key (falls back to the default credential chain).
    #[serde(default)]
    pub secret_access_key: Option<String>,

    /// Session token for temporary credentials.
    #[serde(default)]
    pub session_token: Option<String>,

    /// Per-operation timeout for remote calls, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Total attempts (first try included) for transient failures.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::default(),
            bucket: String::new(),
            region: default_region(),
            endpoint_url: None,
            use_path_style: false,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            request_timeout_seconds: default_request_timeout(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Presigned URL configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PresignConfig {
    /// Lifetime of upload URLs, in seconds.
    #[serde(default = "default_upload_expiry")]
    pub upload_expiry_seconds: u64,

    /// Lifetime of download URLs, in seconds.
    #[serde(default = "default_download_expiry")]
    pub download_expiry_seconds: u64,

    /// The only content type accepted for uploads.
    #[serde(default = "default_content_type")]
    pub allowed_content_type: String,
}

impl Default for PresignConfig {
    fn default() -> Self {
        Self {
            upload_expiry_seconds: default_upload_expiry(),
            download_expiry_seconds: default_download_expiry(),
            allowed_content_type: default_content_type(),
        }
    }
}

/// Metadata file configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Path to the JSON metadata file.
    #[serde(default = "default_metadata_path")]
    pub path: String,

    /// Reaction to an unreadable metadata file: `fail` or `empty`.
    #[serde(default)]
    pub on_load_error: LoadErrorPolicy,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
            on_load_error: LoadErrorPolicy::default(),
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

    /// Force debug verbosity.
    #[serde(default)]
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            debug: false,
        }
    }
}

impl LoggingConfig {
    /// Level actually used when `RUST_LOG` is not set.
    pub fn effective_level(&self) -> &str {
        if self.debug {
            "debug"
        } else {
            &self.level
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
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
    8000
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_upload_expiry() -> u64 {
    900
}

fn default_download_expiry() -> u64 {
    3600
}

fn default_content_type() -> String {
    "application/pdf".to_string()
}

fn default_metadata_path() -> String {
    "./data/documents_metadata.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Environment overrides ---------------------------------------------------

impl Config {
    /// Apply environment overrides, reading variables through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(region) = var("AWS_REGION") {
            self.storage.region = region;
        }
        if let Some(bucket) = var("S3_BUCKET_NAME") {
            self.storage.bucket = bucket;
        }
        if let Some(endpoint) = var("AWS_ENDPOINT_URL") {
            self.storage.endpoint_url = Some(endpoint);
        }
        if let Some(key) = var("AWS_ACCESS_KEY_ID") {
            self.storage.access_key_id = Some(key);
        }
        if let Some(secret) = var("AWS_SECRET_ACCESS_KEY") {
            self.storage.secret_access_key = Some(secret);
        }
        if let Some(token) = var("AWS_SESSION_TOKEN") {
            self.storage.session_token = Some(token);
        }
        if let Some(raw) = var("PRESIGNED_URL_EXPIRATION_UPLOAD") {
            self.presign.upload_expiry_seconds = raw
                .trim()
                .parse()
                .with_context(|| format!("PRESIGNED_URL_EXPIRATION_UPLOAD is not a number: {raw}"))?;
        }
        if let Some(raw) = var("PRESIGNED_URL_EXPIRATION_DOWNLOAD") {
            self.presign.download_expiry_seconds = raw.trim().parse().with_context(|| {
                format!("PRESIGNED_URL_EXPIRATION_DOWNLOAD is not a number: {raw}")
            })?;
        }
        if let Some(raw) = var("DEBUG") {
            self.logging.debug = raw.trim().eq_ignore_ascii_case("true");
        }
        if let Some(path) = var("METADATA_FILE") {
            self.metadata.path = path;
        }
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.backend == StorageBackendKind::Aws && self.storage.bucket.trim().is_empty()
        {
            bail!("storage.bucket is not configured (set S3_BUCKET_NAME)");
        }
        for (name, value) in [
            ("presign.upload_expiry_seconds", self.presign.upload_expiry_seconds),
            ("presign.download_expiry_seconds", self.presign.download_expiry_seconds),
        ] {
            if value == 0 || value > MAX_PRESIGN_EXPIRY_SECONDS {
                bail!("{name} must be between 1 and {MAX_PRESIGN_EXPIRY_SECONDS}, got {value}");
            }
        }
        if self.storage.max_attempts == 0 {
            bail!("storage.max_attempts must be at least 1");
        }
        if self.storage.request_timeout_seconds == 0 {
            bail!("storage.request_timeout_seconds must be at least 1");
        }
        if self.presign.allowed_content_type.trim().is_empty() {
            bail!("presign.allowed_content_type must not be empty");
        }
        if self.metadata.path.trim().is_empty() {
            bail!("metadata.path must not be empty");
        }
        Ok(())
    }
}

// -- Loader ------------------------------------------------------------------

/// Parse configuration from YAML text.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    Ok(serde_yaml::from_str(contents)?)
}

/// Load configuration from the YAML file at `path` (defaults when the file
/// does not exist), apply environment overrides and validate.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        parse_config(&contents).with_context(|| format!("invalid config {}", path.display()))?
    } else {
        info!(
            "Config file {} not found, using defaults and environment",
            path.display()
        );
        Config::default()
    };
    config.apply_env(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.storage.backend, StorageBackendKind::Aws);
        assert_eq!(config.presign.upload_expiry_seconds, 900);
        assert_eq!(config.presign.download_expiry_seconds, 3600);
        assert_eq!(config.presign.allowed_content_type, "application/pdf");
        assert_eq!(config.metadata.path, "./data/documents_metadata.json");
        assert_eq!(config.metadata.on_load_error, LoadErrorPolicy::Fail);
        assert!(config.observability.metrics);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server:
  port: 9100
storage:
  backend: memory
  bucket: my-docs
  region: sa-east-1
  max_attempts: 5
presign:
  upload_expiry_seconds: 300
metadata:
  path: /var/lib/docbroker/meta.json
  on_load_error: empty
logging:
  format: json
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.backend, StorageBackendKind::Memory);
        assert_eq!(config.storage.bucket, "my-docs");
        assert_eq!(config.storage.region, "sa-east-1");
        assert_eq!(config.storage.max_attempts, 5);
        assert_eq!(config.presign.upload_expiry_seconds, 300);
        assert_eq!(config.presign.download_expiry_seconds, 3600);
        assert_eq!(config.metadata.on_load_error, LoadErrorPolicy::Empty);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = parse_config("  \n").unwrap();
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_env(env(&[
                ("S3_BUCKET_NAME", "env-bucket"),
                ("AWS_REGION", "eu-west-1"),
                ("PRESIGNED_URL_EXPIRATION_UPLOAD", "120"),
                ("PRESIGNED_URL_EXPIRATION_DOWNLOAD", " 600 "),
                ("DEBUG", "True"),
                ("AWS_ACCESS_KEY_ID", "AKID"),
                ("AWS_SECRET_ACCESS_KEY", "secret"),
                ("METADATA_FILE", "/tmp/m.json"),
            ]))
            .unwrap();

        assert_eq!(config.storage.bucket, "env-bucket");
        assert_eq!(config.storage.region, "eu-west-1");
        assert_eq!(config.presign.upload_expiry_seconds, 120);
        assert_eq!(config.presign.download_expiry_seconds, 600);
        assert!(config.logging.debug);
        assert_eq!(config.logging.effective_level(), "debug");
        assert_eq!(config.storage.access_key_id.as_deref(), Some("AKID"));
        assert_eq!(config.storage.session_token, None);
        assert_eq!(config.metadata.path, "/tmp/m.json");
    }

    #[test]
    fn test_env_bad_number() {
        let mut config = Config::default();
        assert!(config
            .apply_env(env(&[("PRESIGNED_URL_EXPIRATION_UPLOAD", "soon")]))
            .is_err());
    }

    #[test]
    fn test_validate_requires_bucket_for_aws() {
        let mut config = Config::default();
        assert!(config.validate().is_err());
        config.storage.bucket = "b".to_string();
        assert!(config.validate().is_ok());

        let mut memory = Config::default();
        memory.storage.backend = StorageBackendKind::Memory;
        assert!(memory.validate().is_ok());
    }

    #[test]
    fn test_validate_expiry_bounds() {
        let mut config = Config::default();
        config.storage.bucket = "b".to_string();
        config.presign.download_expiry_seconds = MAX_PRESIGN_EXPIRY_SECONDS + 1;
        assert!(config.validate().is_err());
        config.presign.download_expiry_seconds = MAX_PRESIGN_EXPIRY_SECONDS;
        config.presign.upload_expiry_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_attempts() {
        let mut config = Config::default();
        config.storage.bucket = "b".to_string();
        config.storage.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
