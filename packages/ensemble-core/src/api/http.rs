//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the registry and cache.

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::api::response::api_success;
use crate::api::stream::stream_audio;
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::EnsembleResult;
use crate::extract::AudioHandle;
use crate::protocol_constants::SERVICE_ID;
use crate::state::Config;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractRequest {
    video_ids: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    Router::new()
        .route("/health", get(health_check))
        .route("/extract", post(handle_extract))
        .route("/stream/{video_id}", get(stream_audio))
        .route("/ws/{room_id}/{role}", get(ws_handler))
        .layer(cors)
        .with_state(state)
}

/// Builds the CORS layer from the configured allowed origin.
///
/// With an explicit origin the layer allows credentialed requests from it
/// only; without one the API is open (useful for local development).
fn cors_layer(config: &Config) -> CorsLayer {
    let Some(origin) = &config.cors_origin else {
        return CorsLayer::permissive();
    };
    match origin.parse::<HeaderValue>() {
        Ok(value) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true),
        Err(_) => {
            log::warn!(
                "[Server] Invalid cors_origin '{}', falling back to permissive CORS",
                origin
            );
            CorsLayer::permissive()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe: "Is the process running?"
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": state.registry.len()
    }))
}

/// Batch cache resolution: extracts every requested id (single-flight per
/// id) and reports a per-id outcome.
async fn handle_extract(
    State(state): State<AppState>,
    Json(payload): Json<ExtractRequest>,
) -> impl IntoResponse {
    log::info!(
        "[Extract] Batch request for {} id(s)",
        payload.video_ids.len()
    );
    let outcomes = state.cache.resolve_batch(&payload.video_ids).await;
    let results: Vec<serde_json::Value> = outcomes
        .into_iter()
        .map(|(id, outcome)| batch_entry(&id, &outcome))
        .collect();
    api_success(json!({ "results": results }))
}

/// Shapes one batch outcome for the response body.
fn batch_entry(video_id: &str, outcome: &EnsembleResult<AudioHandle>) -> serde_json::Value {
    match outcome {
        Ok(handle) => json!({
            "videoId": video_id,
            "status": "ready",
            "length": handle.len
        }),
        Err(e) => json!({
            "videoId": video_id,
            "status": "failed",
            "error": e.to_string()
        }),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EnsembleError;
    use std::path::PathBuf;
    use std::sync::Arc;

    #[test]
    fn batch_entry_ready_carries_length() {
        let handle = AudioHandle {
            path: Arc::new(PathBuf::from("/cache/abc12345678.mp3")),
            len: 1024,
        };
        let entry = batch_entry("abc12345678", &Ok(handle));
        assert_eq!(entry["videoId"], "abc12345678");
        assert_eq!(entry["status"], "ready");
        assert_eq!(entry["length"], 1024);
        assert!(entry.get("error").is_none());
    }

    #[test]
    fn batch_entry_failed_carries_error() {
        let err = EnsembleError::Extraction {
            video_id: "abc12345678".to_string(),
            cause: "boom".to_string(),
        };
        let entry = batch_entry("abc12345678", &Err(err));
        assert_eq!(entry["status"], "failed");
        assert!(entry["error"].as_str().unwrap().contains("boom"));
        assert!(entry.get("length").is_none());
    }
}
