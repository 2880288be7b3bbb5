//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by external contracts (provider identifier
//! format, wire protocol expectations of the web client) and changing them
//! would break compatibility.

// ─────────────────────────────────────────────────────────────────────────────
// Track Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Exact length of a provider video identifier.
///
/// The provider uses fixed 11-character identifiers drawn from
/// `[A-Za-z0-9_-]`. Anything else is rejected at the boundary.
pub const VIDEO_ID_LEN: usize = 11;

// ─────────────────────────────────────────────────────────────────────────────
// Room Channel
// ─────────────────────────────────────────────────────────────────────────────

/// Capacity of each room's event broadcast channel.
///
/// A member that falls this many events behind is considered desynchronized
/// and is disconnected rather than served a gap in the event order.
pub const ROOM_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Role path segment for the playback-controlling member.
pub const ROLE_HOST: &str = "host";

/// Role path segment for passive members.
pub const ROLE_GUEST: &str = "guest";

/// Seconds a fresh WebSocket connection may sit unauthenticated before it
/// is closed.
pub const WS_AUTH_TIMEOUT_SECS: u64 = 30;

// ─────────────────────────────────────────────────────────────────────────────
// Audio Serving
// ─────────────────────────────────────────────────────────────────────────────

/// Content type for extracted audio.
///
/// The extractor always transcodes to MP3, so every stream response carries
/// this type regardless of the provider's source format.
pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "ensemble";
