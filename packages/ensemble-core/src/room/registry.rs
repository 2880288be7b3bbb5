//! Room lookup and lifecycle.
//!
//! Rooms exist only while occupied: the first join creates the session, the
//! session removes its own entry when its last member leaves. Room ids are
//! case-insensitive and normalized to lowercase at this boundary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::auth::UserProfile;
use crate::room::presence::Role;
use crate::room::session::{JoinAck, RoomHandle, RoomSession};

pub struct RoomRegistry {
    rooms: Arc<DashMap<String, RoomHandle>>,
    next_session_id: AtomicU64,
    promote_on_host_leave: bool,
}

impl RoomRegistry {
    pub fn new(promote_on_host_leave: bool) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            next_session_id: AtomicU64::new(1),
            promote_on_host_leave,
        }
    }

    /// Admits a connection to a room, creating the room if needed.
    ///
    /// A handle can go stale between lookup and join when the session's
    /// last member leaves concurrently; the stale session has already
    /// removed its registry entry, so one more resolve reaches a live
    /// session. Two attempts are enough: a freshly created session cannot
    /// close before this (its only prospective) join reaches its mailbox.
    pub async fn join(
        &self,
        room_id: &str,
        conn_id: &str,
        user: &UserProfile,
        requested_role: Role,
    ) -> (RoomHandle, JoinAck) {
        loop {
            let handle = self.get_or_create(room_id);
            match handle
                .join(conn_id.to_string(), user.clone(), requested_role)
                .await
            {
                Ok(ack) => return (handle, ack),
                Err(_) => {
                    log::debug!(
                        "[Registry] Session for '{}' closed during join, re-resolving",
                        room_id
                    );
                }
            }
        }
    }

    /// Returns the live handle for a room, spawning a session on first use.
    pub fn get_or_create(&self, room_id: &str) -> RoomHandle {
        let key = normalize_room_id(room_id);
        self.rooms
            .entry(key.clone())
            .or_insert_with(|| {
                let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                log::info!("[Registry] Creating room '{}'", key);
                RoomSession::spawn(
                    key.clone(),
                    session_id,
                    self.promote_on_host_leave,
                    Arc::clone(&self.rooms),
                )
            })
            .clone()
    }

    /// Number of live rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

fn normalize_room_id(room_id: &str) -> String {
    room_id.to_ascii_lowercase()
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::session::RoomCommand;
    use std::time::Duration;

    fn user(id: &str) -> UserProfile {
        UserProfile {
            user_id: id.to_string(),
            display_name: format!("User {}", id),
            avatar_url: String::new(),
        }
    }

    #[tokio::test]
    async fn room_ids_are_case_insensitive() {
        let registry = RoomRegistry::new(false);
        let a = registry.get_or_create("Lounge");
        let b = registry.get_or_create("lounge");
        assert_eq!(a.room_id(), b.room_id());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn join_creates_room_and_release_frees_id() {
        let registry = RoomRegistry::new(false);
        let (handle, ack) = registry.join("lounge", "c1", &user("h"), Role::Host).await;
        assert_eq!(ack.role, Role::Host);
        assert_eq!(registry.len(), 1);

        handle
            .send(RoomCommand::Leave {
                conn_id: "c1".into(),
            })
            .unwrap();
        for _ in 0..50 {
            if registry.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(registry.is_empty());

        // The id is reusable; the new session starts empty and grants host
        let (_handle, ack) = registry.join("lounge", "c2", &user("g"), Role::Host).await;
        assert_eq!(ack.role, Role::Host);
        assert!(ack.queue.is_empty());
    }
}
