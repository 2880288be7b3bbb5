//! WebSocket handler for room membership and playback control.
//!
//! Connections arrive at `/ws/{room_id}/{role}`, must authenticate with
//! their first message, and are then admitted to the room session. After
//! admission the handler is a pump: incoming control messages become room
//! commands, room broadcasts become outgoing frames. All room state lives
//! in the session task; this handler holds none.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::sink::SinkExt;
use futures::stream::{SplitStream, StreamExt};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

use crate::api::response::api_error;
use crate::api::AppState;
use crate::auth::UserProfile;
use crate::protocol_constants::{ROLE_GUEST, ROLE_HOST, WS_AUTH_TIMEOUT_SECS};
use crate::room::{ClientMessage, Role, RoomCommand, RoomHandle, ServerEvent};
use crate::track::validate_video_id;

// ─────────────────────────────────────────────────────────────────────────────
// Membership Guard (RAII cleanup)
// ─────────────────────────────────────────────────────────────────────────────

/// RAII guard that leaves the room on drop.
///
/// This prevents ghost members if the handler panics or exits early after
/// the connection has been admitted to a session.
struct RoomMembershipGuard {
    handle: RoomHandle,
    conn_id: String,
}

impl Drop for RoomMembershipGuard {
    fn drop(&mut self) {
        let _ = self.handle.send(RoomCommand::Leave {
            conn_id: self.conn_id.clone(),
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Upgrade
// ─────────────────────────────────────────────────────────────────────────────

fn parse_role(segment: &str) -> Option<Role> {
    match segment {
        ROLE_HOST => Some(Role::Host),
        ROLE_GUEST => Some(Role::Guest),
        _ => None,
    }
}

/// WebSocket upgrade handler.
pub(super) async fn ws_handler(
    Path((room_id, role)): Path<(String, String)>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(requested_role) = parse_role(&role) else {
        return api_error(
            StatusCode::BAD_REQUEST,
            "invalid_role",
            format!("unknown role '{}', expected 'host' or 'guest'", role),
        )
        .into_response();
    };
    ws.on_upgrade(move |socket| handle_ws(socket, state, room_id, requested_role))
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

/// Main WebSocket connection handler.
async fn handle_ws(socket: WebSocket, state: AppState, room_id: String, requested_role: Role) {
    let (mut sender, mut receiver) = socket.split();

    // Register connection for tracking and force-close capability
    let conn_guard = state.ws_manager.register();
    let cancel_token = conn_guard.cancel_token().clone();

    log::info!(
        "[WS] New connection {} for room '{}' as {:?}",
        conn_guard.id(),
        room_id,
        requested_role
    );

    // Pre-admission: first message must be a valid auth envelope
    let user = match authenticate(&state, &mut receiver).await {
        Ok(user) => user,
        Err(message) => {
            log::warn!("[WS] {}: auth rejected: {}", conn_guard.id(), message);
            if let Some(msg) = (ServerEvent::Error { message }).to_message() {
                let _ = sender.send(msg).await;
            }
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let (handle, ack) = state
        .registry
        .join(&room_id, conn_guard.id(), &user, requested_role)
        .await;

    // Guard created before the first send so any early exit still leaves
    let membership = RoomMembershipGuard {
        handle: handle.clone(),
        conn_id: conn_guard.id().to_string(),
    };
    let mut events = ack.events;

    let snapshot = ServerEvent::AuthSuccess {
        user: user.clone(),
        is_host: ack.role == Role::Host,
        queue: ack.queue,
        current_song: ack.current_song,
        playing: ack.playing,
    };
    if let Some(msg) = snapshot.to_message() {
        if sender.send(msg).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            // Handle force-close request
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: {}", conn_guard.id());
                break;
            }
            // Incoming control messages from the client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(parsed) => {
                                if !dispatch(&membership.handle, conn_guard.id(), parsed) {
                                    // Session closed underneath us
                                    break;
                                }
                            }
                            Err(e) => {
                                log::debug!(
                                    "[WS] {}: dropping malformed message: {}",
                                    conn_guard.id(),
                                    e
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            // Room broadcasts fanned out to this member
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if let Some(msg) = event.to_message() {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        // A gap in the event order would desynchronize this
                        // member; disconnect so the client reconnects fresh.
                        log::warn!(
                            "[WS] {}: lagged {} events, disconnecting",
                            conn_guard.id(),
                            n
                        );
                        break;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    log::info!("[WS] Connection closed: {}", conn_guard.id());
    // RoomMembershipGuard and ConnectionGuard Drop impls handle cleanup
    drop(membership);
}

/// Waits for the auth envelope and verifies the token.
///
/// Non-text frames before auth are ignored; a close, transport error, or
/// timeout fails authentication.
async fn authenticate(
    state: &AppState,
    receiver: &mut SplitStream<WebSocket>,
) -> Result<UserProfile, String> {
    let first = tokio::time::timeout(Duration::from_secs(WS_AUTH_TIMEOUT_SECS), async {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Close(_)) | Err(_) => return None,
                _ => {}
            }
        }
        None
    })
    .await;

    let text = match first {
        Ok(Some(text)) => text,
        Ok(None) => return Err("connection closed before authentication".to_string()),
        Err(_) => return Err("authentication timed out".to_string()),
    };

    match serde_json::from_str::<ClientMessage>(&text) {
        Ok(ClientMessage::Auth { token }) => {
            state.verifier.verify(&token).await.map_err(|e| e.to_string())
        }
        Ok(_) => Err("first message must be an auth envelope".to_string()),
        Err(_) => Err("malformed auth envelope".to_string()),
    }
}

/// Maps a parsed control message onto a room command and sends it.
///
/// Returns `false` only when the session mailbox is closed. Messages with
/// invalid track payloads are dropped here, before they reach the session.
fn dispatch(handle: &RoomHandle, conn_id: &str, msg: ClientMessage) -> bool {
    let cmd = match msg {
        ClientMessage::Auth { .. } => {
            log::debug!("[WS] {}: duplicate auth ignored", conn_id);
            return true;
        }
        ClientMessage::Play { song } => {
            if let Some(track) = &song {
                if let Err(e) = validate_video_id(&track.video_id) {
                    log::warn!("[WS] {}: dropping play with invalid track: {}", conn_id, e);
                    return true;
                }
            }
            RoomCommand::Play {
                conn_id: conn_id.to_string(),
                song,
            }
        }
        ClientMessage::Pause => RoomCommand::Pause {
            conn_id: conn_id.to_string(),
        },
        ClientMessage::Next => RoomCommand::Next {
            conn_id: conn_id.to_string(),
        },
        ClientMessage::Previous => RoomCommand::Previous {
            conn_id: conn_id.to_string(),
        },
        ClientMessage::AddToQueue { song } => {
            if let Err(e) = validate_video_id(&song.video_id) {
                log::warn!(
                    "[WS] {}: dropping addToQueue with invalid track: {}",
                    conn_id,
                    e
                );
                return true;
            }
            RoomCommand::AddToQueue {
                conn_id: conn_id.to_string(),
                track: song,
            }
        }
    };
    handle.send(cmd).is_ok()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_segments_parse_exactly() {
        assert_eq!(parse_role("host"), Some(Role::Host));
        assert_eq!(parse_role("guest"), Some(Role::Guest));
        assert_eq!(parse_role("Host"), None);
        assert_eq!(parse_role("admin"), None);
        assert_eq!(parse_role(""), None);
    }
}
