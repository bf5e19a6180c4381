use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::path::PathBuf;
use std::time::Duration;

pub const MIB: u64 = 1024 * 1024;

/// Headroom on top of `max_file_size` for multipart boundaries and part headers.
const MULTIPART_ENVELOPE_BYTES: u64 = MIB;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub common: core_config::Config,
    pub upstream: UpstreamConfig,
    pub upload: UploadConfig,
    pub compression: CompressionConfig,
    pub server: ServerConfig,
}

/// Service-specific sections, deserialized from the same layered sources as
/// the common config.
#[derive(Debug, Deserialize)]
struct RelaySettings {
    upstream: UpstreamConfig,
    #[serde(default)]
    upload: UploadConfig,
    #[serde(default)]
    compression: CompressionConfig,
    #[serde(default)]
    server: ServerConfig,
}

/// The remote analysis API every upload is forwarded to.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Full URL of the analyze endpoint, e.g. `https://analysis.internal/analyze`.
    pub url: String,
    /// Sent as `X-API-Key` on every forwarded request.
    pub api_key: Secret<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Skip TLS certificate verification for self-signed upstreams.
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

fn default_timeout_secs() -> u64 {
    9 * 60
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_size: u64,
    /// Write uploads to temp files in this directory instead of holding them in memory.
    pub spool_dir: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * MIB,
            spool_dir: None,
        }
    }
}

impl UploadConfig {
    /// Request body limit applied to the upload routes.
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.max_file_size.saturating_add(MULTIPART_ENVELOPE_BYTES))
            .unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// Images strictly larger than this are re-encoded.
    pub threshold_bytes: u64,
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_bytes: MIB,
            max_dimension: 1920,
            jpeg_quality: 90,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory served for any path not matched by an API route.
    pub static_dir: Option<PathBuf>,
}

impl RelayConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let settings: RelaySettings = core_config::layered_sources()
            .build()?
            .try_deserialize()?;

        let config = RelayConfig {
            common,
            upstream: settings.upstream,
            upload: settings.upload,
            compression: settings.compression,
            server: settings.server,
        };
        config.validate()?;

        Ok(config)
    }

    /// Semantic checks serde cannot express. Reports every problem at once.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();

        match reqwest::Url::parse(&self.upstream.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(format!(
                "upstream.url must use http or https, got '{}'",
                url.scheme()
            )),
            Err(e) => errors.push(format!("upstream.url is not a valid URL: {}", e)),
        }

        if self.upstream.api_key.expose_secret().trim().is_empty() {
            errors.push("upstream.api_key must not be empty".to_string());
        }
        if self.upstream.timeout_secs == 0 {
            errors.push("upstream.timeout_secs must be greater than zero".to_string());
        }
        if self.upload.max_file_size == 0 {
            errors.push("upload.max_file_size must be greater than zero".to_string());
        }
        if self.compression.max_dimension == 0 {
            errors.push("compression.max_dimension must be greater than zero".to_string());
        }
        if !(1..=100).contains(&self.compression.jpeg_quality) {
            errors.push("compression.jpeg_quality must be between 1 and 100".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::ConfigError(anyhow::anyhow!(errors.join(", "))))
        }
    }
}
