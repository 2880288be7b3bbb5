//! Application bootstrap and dependency wiring.
//!
//! The composition root: the single place where the registry, cache,
//! identity verifier and connection manager are instantiated and wired
//! together.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::api::{AppState, WsConnectionManager};
use crate::auth::{HttpIdentityVerifier, IdentityVerifier};
use crate::error::{EnsembleError, EnsembleResult};
use crate::extract::{ExtractionCache, YtDlpExtractor};
use crate::room::RoomRegistry;
use crate::state::Config;

const HTTP_CLIENT_TIMEOUT_SECS: u64 = 15;

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Live rooms and their session handles.
    pub registry: Arc<RoomRegistry>,
    /// Single-flight audio extraction cache.
    pub cache: Arc<ExtractionCache>,
    /// External identity collaborator.
    pub verifier: Arc<dyn IdentityVerifier>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
}

impl BootstrappedServices {
    /// Builds the API-layer state from the wired services.
    pub fn to_app_state(&self, config: Arc<Config>) -> AppState {
        AppState::builder()
            .registry(Arc::clone(&self.registry))
            .cache(Arc::clone(&self.cache))
            .verifier(Arc::clone(&self.verifier))
            .ws_manager(Arc::clone(&self.ws_manager))
            .config(config)
            .build()
    }

    /// Initiates graceful shutdown.
    ///
    /// Force-closing the WebSocket connections drains every room; each
    /// session then tears itself down when its last member leaves.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");
        let closed = self.ws_manager.close_all();
        log::info!(
            "[Bootstrap] Signalled {} connection(s), {} room(s) live at shutdown",
            closed,
            self.registry.len()
        );
    }
}

/// Instantiates and wires all services from the configuration.
pub fn bootstrap_services(config: &Config) -> EnsembleResult<BootstrappedServices> {
    config
        .extraction
        .validate()
        .map_err(EnsembleError::Validation)?;

    let http_client = Client::builder()
        .timeout(Duration::from_secs(HTTP_CLIENT_TIMEOUT_SECS))
        .build()
        .map_err(|e| EnsembleError::Internal(format!("failed to build HTTP client: {}", e)))?;
    let verifier: Arc<dyn IdentityVerifier> = Arc::new(HttpIdentityVerifier::new(
        http_client,
        config.identity_url.clone(),
    ));

    let extractor = Arc::new(YtDlpExtractor::new(&config.extraction));
    let cache = Arc::new(ExtractionCache::new(&config.extraction, extractor)?);
    let registry = Arc::new(RoomRegistry::new(config.promote_on_host_leave));
    let ws_manager = Arc::new(WsConnectionManager::new());

    log::info!(
        "[Bootstrap] Services wired: cache_dir={}, cache_capacity={}, identity_url={}",
        config.extraction.cache_dir.display(),
        config.extraction.cache_capacity,
        config.identity_url
    );

    Ok(BootstrappedServices {
        registry,
        cache,
        verifier,
        ws_manager,
    })
}
