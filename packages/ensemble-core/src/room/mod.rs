//! Synchronized listening rooms.
//!
//! A room is an ephemeral, named session with one host and any number of
//! guests. Each room is backed by a single actor task ([`session`]) that
//! applies all mutations serially and broadcasts the resulting events to
//! every member, so every member observes the same linear sequence of state
//! transitions without any locking on room state.

mod presence;
mod protocol;
mod queue;
mod registry;
mod session;

pub use presence::{Member, PresenceRegistry, Role};
pub use protocol::{ClientMessage, ServerEvent};
pub use queue::TrackQueue;
pub use registry::RoomRegistry;
pub use session::{JoinAck, RoomClosed, RoomCommand, RoomHandle};
