//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `ENSEMBLE_BIND_PORT`
    pub bind_port: u16,

    /// Allowed CORS origin for the web client.
    /// Override: `ENSEMBLE_CORS_ORIGIN`
    pub cors_origin: Option<String>,

    /// Base URL of the identity service used to verify tokens.
    /// Override: `ENSEMBLE_IDENTITY_URL`
    pub identity_url: String,

    /// Promote the oldest guest to host when the host disconnects.
    pub promote_on_host_leave: bool,

    /// Directory for extracted audio files.
    /// Override: `ENSEMBLE_CACHE_DIR`
    pub cache_dir: PathBuf,

    /// Path to the yt-dlp binary.
    /// Override: `ENSEMBLE_YT_DLP_PATH`
    pub yt_dlp_path: PathBuf,

    /// Optional cookies file passed to yt-dlp.
    pub cookies_path: Option<PathBuf>,

    /// Seconds before a hung extraction is killed.
    pub extraction_timeout_secs: u64,

    /// Maximum number of cached audio files before LRU eviction.
    pub cache_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let core = ensemble_core::Config::default();
        Self {
            bind_port: core.preferred_port,
            cors_origin: core.cors_origin,
            identity_url: core.identity_url,
            promote_on_host_leave: core.promote_on_host_leave,
            cache_dir: core.extraction.cache_dir,
            yt_dlp_path: core.extraction.yt_dlp_path,
            cookies_path: core.extraction.cookies_path,
            extraction_timeout_secs: core.extraction.timeout_secs,
            cache_capacity: core.extraction.cache_capacity,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ENSEMBLE_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("ENSEMBLE_CORS_ORIGIN") {
            if !val.is_empty() {
                self.cors_origin = Some(val);
            }
        }

        if let Ok(val) = std::env::var("ENSEMBLE_IDENTITY_URL") {
            if !val.is_empty() {
                self.identity_url = val;
            }
        }

        if let Ok(val) = std::env::var("ENSEMBLE_CACHE_DIR") {
            if !val.is_empty() {
                self.cache_dir = PathBuf::from(val);
            }
        }

        if let Ok(val) = std::env::var("ENSEMBLE_YT_DLP_PATH") {
            if !val.is_empty() {
                self.yt_dlp_path = PathBuf::from(val);
            }
        }
    }

    /// Converts to ensemble-core's Config type.
    pub fn to_core_config(&self) -> ensemble_core::Config {
        ensemble_core::Config {
            preferred_port: self.bind_port,
            cors_origin: self.cors_origin.clone(),
            identity_url: self.identity_url.clone(),
            promote_on_host_leave: self.promote_on_host_leave,
            extraction: ensemble_core::ExtractionConfig {
                cache_dir: self.cache_dir.clone(),
                yt_dlp_path: self.yt_dlp_path.clone(),
                cookies_path: self.cookies_path.clone(),
                timeout_secs: self.extraction_timeout_secs,
                cache_capacity: self.cache_capacity,
            },
        }
    }
}
