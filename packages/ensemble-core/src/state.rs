//! Core application configuration.
//!
//! [`Config`] holds everything the core services need at construction time.
//! The standalone server builds one from its YAML file and CLI flags.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the extraction cache and the external extractor.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Directory where extracted audio files are written.
    pub cache_dir: PathBuf,

    /// Path to the `yt-dlp` executable.
    pub yt_dlp_path: PathBuf,

    /// Optional cookies file passed to the extractor.
    pub cookies_path: Option<PathBuf>,

    /// Hard deadline for a single extraction (seconds). A hung external
    /// process is killed and the attempt counted as failed once this
    /// elapses, so cache waiters are never blocked indefinitely.
    pub timeout_secs: u64,

    /// Maximum number of ready entries kept in the cache. Least-recently
    /// served entries are evicted beyond this.
    pub cache_capacity: usize,
}

impl ExtractionConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_secs == 0 {
            return Err("timeout_secs must be >= 1".to_string());
        }
        if self.cache_capacity == 0 {
            return Err("cache_capacity must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./audio-cache"),
            yt_dlp_path: PathBuf::from("yt-dlp"),
            cookies_path: None,
            timeout_secs: 120,
            cache_capacity: 64,
        }
    }
}

/// Configuration for the Ensemble server.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    // Server
    /// Port for the HTTP/WS server.
    pub preferred_port: u16,

    /// Allowed CORS origin for the web client. `None` disables CORS
    /// headers entirely (same-origin deployments).
    pub cors_origin: Option<String>,

    // Identity
    /// Endpoint of the external identity collaborator used to verify
    /// member tokens sent over the room channel.
    pub identity_url: String,

    // Rooms
    /// Whether the longest-connected guest is promoted to host when the
    /// host disconnects. Off by default: the observed behavior of the
    /// system is a host-less room until a new host joins.
    pub promote_on_host_leave: bool,

    // Extraction
    /// Extraction cache and extractor settings.
    pub extraction: ExtractionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 4000,
            cors_origin: None,
            identity_url: "http://127.0.0.1:5000/verify".to_string(),
            promote_on_host_leave: false,
            extraction: ExtractionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.extraction.validate().is_ok());
        assert!(!config.promote_on_host_leave);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = ExtractionConfig {
            timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = ExtractionConfig {
            cache_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
