use crate::error::AppError;
use config::{Config as Cfg, ConfigBuilder, File, builder::DefaultState};
use serde::Deserialize;

/// Settings shared by every service binary.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// OTLP collector endpoint. Span export is disabled when unset.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

/// Layered configuration sources: optional `configuration.*` file, then
/// `APP__`-prefixed environment variables (`APP__UPSTREAM__URL` -> `upstream.url`).
///
/// Loads `.env` first so local development picks up the same variables.
pub fn layered_sources() -> ConfigBuilder<DefaultState> {
    dotenvy::dotenv().ok();

    Cfg::builder()
        .add_source(File::with_name("configuration").required(false))
        .add_source(config::Environment::with_prefix("APP").separator("__"))
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        let config = layered_sources().build()?;

        Ok(config.try_deserialize()?)
    }
}
