//! Ensemble Core - shared library for Ensemble.
//!
//! This crate provides the core functionality for Ensemble, a
//! synchronized-listening server: named rooms over WebSocket where one
//! host drives playback for everyone, backed by a single-flight audio
//! extraction cache and a byte-range HTTP audio endpoint.
//!
//! # Architecture
//!
//! - [`room`]: room registry, per-room session actors, presence and the
//!   wire protocol
//! - [`extract`]: yt-dlp subprocess runner and the extraction cache
//! - [`api`]: HTTP/WebSocket surface (axum)
//! - [`auth`]: external identity verification behind a trait seam
//! - [`state`]: configuration
//! - [`error`]: centralized error types
//!
//! # Abstraction Traits
//!
//! Two seams decouple the core from its collaborators:
//!
//! - [`IdentityVerifier`](auth::IdentityVerifier): token verification
//! - [`AudioExtractor`](extract::AudioExtractor): audio acquisition
//!
//! Each has a production implementation suitable for the standalone
//! server; tests inject mocks at the same seams.

#![warn(clippy::all)]

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod extract;
pub mod protocol_constants;
pub mod room;
pub mod state;
pub mod track;

// Re-export commonly used types at the crate root
pub use auth::{HttpIdentityVerifier, IdentityVerifier, UserProfile};
pub use error::{EnsembleError, EnsembleResult};
pub use state::{Config, ExtractionConfig};
pub use track::{validate_video_id, Track};

// Re-export room types
pub use room::{ClientMessage, Member, Role, RoomHandle, RoomRegistry, ServerEvent};

// Re-export extraction types
pub use extract::{AudioExtractor, AudioHandle, ExtractionCache, YtDlpExtractor};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, AppStateBuilder, ServerError, WsConnectionManager};
