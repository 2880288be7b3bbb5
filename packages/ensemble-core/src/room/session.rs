//! The room session actor.
//!
//! One task per room consumes a single mailbox serially: every mutation of
//! the queue/index/playing triple happens inside that task, and each
//! accepted mutation emits exactly one event on the room's broadcast
//! channel. Members therefore observe state transitions in the exact order
//! they were applied, with no locks on room state.
//!
//! Lifecycle: spawned by the registry on first join, terminated when the
//! last member leaves. Termination drains the mailbox first so a join that
//! raced the last leave keeps the session alive; a join that arrives after
//! the registry entry is gone observes [`RoomClosed`] and retries against a
//! fresh session.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::auth::UserProfile;
use crate::protocol_constants::ROOM_EVENT_CHANNEL_CAPACITY;
use crate::room::presence::{PresenceRegistry, Role};
use crate::room::protocol::ServerEvent;
use crate::room::queue::TrackQueue;
use crate::track::Track;

/// Error returned when a command is sent to a terminated session.
#[derive(Debug, Error)]
#[error("room session closed")]
pub struct RoomClosed;

/// Commands accepted by a room session.
///
/// Issued by the WebSocket layer after transport-boundary validation; the
/// session enforces role authorization, the transport enforces shape.
#[derive(Debug)]
pub enum RoomCommand {
    /// Admit an authenticated connection.
    Join {
        conn_id: String,
        user: UserProfile,
        requested_role: Role,
        reply: oneshot::Sender<JoinAck>,
    },
    /// Remove a disconnected member.
    Leave { conn_id: String },
    /// Host: resume playback, optionally selecting a track.
    Play {
        conn_id: String,
        song: Option<Track>,
    },
    /// Host: pause playback.
    Pause { conn_id: String },
    /// Host: advance with wraparound.
    Next { conn_id: String },
    /// Host: retreat with wraparound.
    Previous { conn_id: String },
    /// Any member: propose a queue addition (already format-validated).
    AddToQueue { conn_id: String, track: Track },
}

/// Reply to a successful [`RoomCommand::Join`]: the effective role, a full
/// state snapshot, and a subscription positioned after that snapshot.
#[derive(Debug)]
pub struct JoinAck {
    pub role: Role,
    pub queue: Vec<Track>,
    pub current_song: Option<Track>,
    pub playing: bool,
    pub events: broadcast::Receiver<ServerEvent>,
}

/// Cloneable handle to a room session.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: Arc<str>,
    session_id: u64,
    tx: mpsc::UnboundedSender<RoomCommand>,
}

impl RoomHandle {
    /// Returns the (normalized) room id.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub(crate) fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Sends a command to the session.
    ///
    /// Returns `Err(RoomClosed)` if the session has terminated; the caller
    /// should re-resolve the room through the registry.
    pub fn send(&self, cmd: RoomCommand) -> Result<(), RoomClosed> {
        self.tx.send(cmd).map_err(|_| RoomClosed)
    }

    /// Joins the room, returning the snapshot and event subscription.
    pub async fn join(
        &self,
        conn_id: String,
        user: UserProfile,
        requested_role: Role,
    ) -> Result<JoinAck, RoomClosed> {
        let (reply, ack) = oneshot::channel();
        self.send(RoomCommand::Join {
            conn_id,
            user,
            requested_role,
            reply,
        })?;
        ack.await.map_err(|_| RoomClosed)
    }
}

/// State owned by one room's actor task.
pub(crate) struct RoomSession {
    room_id: Arc<str>,
    session_id: u64,
    queue: TrackQueue,
    playing: bool,
    presence: PresenceRegistry,
    events: broadcast::Sender<ServerEvent>,
    promote_on_host_leave: bool,
    rooms: Arc<DashMap<String, RoomHandle>>,
}

impl RoomSession {
    /// Spawns a session task and returns its handle.
    pub(crate) fn spawn(
        room_id: String,
        session_id: u64,
        promote_on_host_leave: bool,
        rooms: Arc<DashMap<String, RoomHandle>>,
    ) -> RoomHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(ROOM_EVENT_CHANNEL_CAPACITY);
        let room_id: Arc<str> = room_id.into();

        let handle = RoomHandle {
            room_id: Arc::clone(&room_id),
            session_id,
            tx,
        };

        let session = RoomSession {
            room_id,
            session_id,
            queue: TrackQueue::new(),
            playing: false,
            presence: PresenceRegistry::new(),
            events,
            promote_on_host_leave,
            rooms,
        };
        tokio::spawn(session.run(rx));
        handle
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RoomCommand>) {
        log::info!("[Room] Session started: {}", self.room_id);
        while let Some(cmd) = rx.recv().await {
            self.apply(cmd);
            if self.presence.is_empty() && self.try_terminate(&mut rx) {
                break;
            }
        }
        log::info!("[Room] Session terminated: {}", self.room_id);
    }

    /// Decides whether an empty session may tear down.
    ///
    /// Drains queued commands first: a join that raced the last leave keeps
    /// the session alive. Once the mailbox is empty the registry entry is
    /// removed (only if it still points at this session) and teardown
    /// proceeds; any later sender observes a closed mailbox and retries
    /// through the registry.
    fn try_terminate(&mut self, rx: &mut mpsc::UnboundedReceiver<RoomCommand>) -> bool {
        loop {
            match rx.try_recv() {
                Ok(cmd) => {
                    self.apply(cmd);
                    if !self.presence.is_empty() {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => {
                    let session_id = self.session_id;
                    self.rooms
                        .remove_if(self.room_id.as_ref(), |_, h| h.session_id() == session_id);
                    return true;
                }
                Err(TryRecvError::Disconnected) => return true,
            }
        }
    }

    fn apply(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                conn_id,
                user,
                requested_role,
                reply,
            } => self.handle_join(conn_id, user, requested_role, reply),
            RoomCommand::Leave { conn_id } => self.handle_leave(&conn_id),
            RoomCommand::Play { conn_id, song } => self.handle_play(&conn_id, song),
            RoomCommand::Pause { conn_id } => {
                if self.require_host(&conn_id, "pause") {
                    self.playing = false;
                    self.broadcast(ServerEvent::Pause);
                }
            }
            RoomCommand::Next { conn_id } => self.step(&conn_id, true),
            RoomCommand::Previous { conn_id } => self.step(&conn_id, false),
            RoomCommand::AddToQueue { conn_id, track } => self.handle_add(&conn_id, track),
        }
    }

    fn handle_join(
        &mut self,
        conn_id: String,
        user: UserProfile,
        requested_role: Role,
        reply: oneshot::Sender<JoinAck>,
    ) {
        let role = self.presence.add(conn_id.clone(), user.clone(), requested_role);
        if role != requested_role {
            log::warn!(
                "[Room] {}: room already has a host, '{}' demoted to guest",
                self.room_id,
                user.display_name
            );
        }

        let ack = JoinAck {
            role,
            queue: self.queue.tracks().to_vec(),
            current_song: self.queue.current_track().cloned(),
            playing: self.playing,
            events: self.events.subscribe(),
        };
        if reply.send(ack).is_err() {
            // Connection vanished between auth and admission; undo.
            self.presence.remove(&conn_id);
            return;
        }

        log::info!(
            "[Room] {}: '{}' joined as {:?} ({} member(s))",
            self.room_id,
            user.display_name,
            role,
            self.presence.len()
        );
        self.broadcast(ServerEvent::UserJoined { user });
        self.broadcast_members();
    }

    fn handle_leave(&mut self, conn_id: &str) {
        let Some(member) = self.presence.remove(conn_id) else {
            return;
        };
        log::info!(
            "[Room] {}: '{}' left ({} member(s) remain)",
            self.room_id,
            member.user.display_name,
            self.presence.len()
        );
        self.broadcast(ServerEvent::UserLeft {
            user: member.user.clone(),
        });

        if member.role == Role::Host && !self.presence.is_empty() {
            if self.promote_on_host_leave {
                let promoted = self
                    .presence
                    .promote_first_guest()
                    .map(|m| m.user.display_name.clone());
                if let Some(name) = promoted {
                    log::info!("[Room] {}: promoted '{}' to host", self.room_id, name);
                    self.broadcast_members();
                }
            } else {
                log::info!("[Room] {}: host left, room is now host-less", self.room_id);
            }
        }
    }

    fn handle_play(&mut self, conn_id: &str, song: Option<Track>) {
        if !self.require_host(conn_id, "play") {
            return;
        }
        let song = song.map(|s| self.queue.select(s).clone());
        self.playing = true;
        self.broadcast(ServerEvent::Play { song });
    }

    fn step(&mut self, conn_id: &str, forward: bool) {
        let what = if forward { "next" } else { "previous" };
        if !self.require_host(conn_id, what) {
            return;
        }
        let song = if forward {
            self.queue.next()
        } else {
            self.queue.previous()
        }
        .cloned();
        // Empty queue: no-op, no broadcast
        let Some(song) = song else { return };
        self.playing = true;
        self.broadcast(ServerEvent::Play { song: Some(song) });
    }

    fn handle_add(&mut self, conn_id: &str, track: Track) {
        if self.presence.get(conn_id).is_none() {
            return;
        }
        if self.queue.add(track.clone()) {
            self.broadcast(ServerEvent::AddToQueue { song: track });
        } else {
            log::debug!(
                "[Room] {}: duplicate queue addition ignored: {}",
                self.room_id,
                track.video_id
            );
        }
    }

    fn require_host(&self, conn_id: &str, what: &str) -> bool {
        if self.presence.is_host(conn_id) {
            return true;
        }
        log::warn!(
            "[Room] {}: rejected '{}' from non-host connection {}",
            self.room_id,
            what,
            conn_id
        );
        false
    }

    fn broadcast(&self, event: ServerEvent) {
        // Send fails only when no member is subscribed, which is fine.
        let _ = self.events.send(event);
    }

    fn broadcast_members(&self) {
        self.broadcast(ServerEvent::AllUsers {
            users: self.presence.members().to_vec(),
        });
    }
}
