//! Wire protocol for the room channel.
//!
//! The envelope is a closed tagged union on both directions: incoming
//! control messages ([`ClientMessage`]) and outgoing broadcast events
//! ([`ServerEvent`]). Payloads are strongly typed and validated at the
//! transport boundary before they reach the session state machine. Field
//! names and tag values are fixed by the deployed web client.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::auth::UserProfile;
use crate::room::presence::Member;
use crate::track::Track;

/// Incoming control message envelope.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// First message on every connection: identity token to verify.
    Auth { token: String },
    /// Host resumes playback; an accompanying song selects it as current
    /// (appending it to the queue if absent).
    Play {
        #[serde(default)]
        song: Option<Track>,
    },
    /// Host pauses playback.
    Pause,
    /// Host advances to the next queued track (wraps around).
    Next,
    /// Host retreats to the previous queued track (wraps around).
    Previous,
    /// Any member proposes a queue addition.
    AddToQueue { song: Track },
}

/// Outgoing events broadcast to room members.
///
/// Tag values are part of the client contract; the mixed snake/camel casing
/// (`user_joined` vs `addToQueue`) is deliberate.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Sent only to the authenticating connection: its verified profile,
    /// effective role, and a full room snapshot so late joiners converge
    /// without replaying history.
    #[serde(rename = "auth_success")]
    AuthSuccess {
        user: UserProfile,
        #[serde(rename = "isHost")]
        is_host: bool,
        queue: Vec<Track>,
        #[serde(rename = "currentSong", skip_serializing_if = "Option::is_none")]
        current_song: Option<Track>,
        playing: bool,
    },
    /// Full member list, broadcast after membership changes.
    #[serde(rename = "all_users")]
    AllUsers { users: Vec<Member> },
    /// A member was admitted.
    #[serde(rename = "user_joined")]
    UserJoined { user: UserProfile },
    /// A member disconnected.
    #[serde(rename = "user_left")]
    UserLeft { user: UserProfile },
    /// Playback resumed; `song` is present when the current track changed
    /// (explicit selection, next, previous).
    #[serde(rename = "play")]
    Play {
        #[serde(skip_serializing_if = "Option::is_none")]
        song: Option<Track>,
    },
    /// Playback paused.
    #[serde(rename = "pause")]
    Pause,
    /// A track was appended to the queue.
    #[serde(rename = "addToQueue")]
    AddToQueue { song: Track },
    /// Connection-directed error (failed auth, rejected connect).
    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    /// Serializes the event to a WebSocket text message.
    pub fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|s| Message::Text(s.into()))
    }
}
