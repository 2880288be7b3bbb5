//! Presence bookkeeping for one room.
//!
//! Pure data structure owned by the room session task; never touched from
//! outside the session's serial loop. Maintains the single-host invariant:
//! at most one member holds [`Role::Host`] at any instant.

use serde::Serialize;

use crate::auth::UserProfile;

/// Role of a member within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The single member authorized to issue playback-control commands.
    Host,
    /// Passive member; receives state and may propose queue additions.
    Guest,
}

/// A connected, authenticated member.
#[derive(Debug, Clone, Serialize)]
pub struct Member {
    /// Connection identity; internal, not part of the wire shape.
    #[serde(skip)]
    pub conn_id: String,
    /// Verified user profile.
    #[serde(flatten)]
    pub user: UserProfile,
    /// Effective role (may differ from the requested role, see
    /// [`PresenceRegistry::add`]).
    pub role: Role,
}

/// Membership registry scoped to one room session.
///
/// Insertion order is preserved so host promotion (when enabled) can pick
/// the longest-connected guest.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    members: Vec<Member>,
}

impl PresenceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a member, returning the effective role.
    ///
    /// A second connection requesting `host` while the room already has one
    /// is demoted to guest; the single-host invariant is never violated.
    pub fn add(&mut self, conn_id: String, user: UserProfile, requested: Role) -> Role {
        let role = if requested == Role::Host && self.has_host() {
            Role::Guest
        } else {
            requested
        };
        self.members.push(Member {
            conn_id,
            user,
            role,
        });
        role
    }

    /// Removes a member by connection id, returning it if present.
    pub fn remove(&mut self, conn_id: &str) -> Option<Member> {
        let idx = self.members.iter().position(|m| m.conn_id == conn_id)?;
        Some(self.members.remove(idx))
    }

    /// Returns the member bound to a connection.
    pub fn get(&self, conn_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.conn_id == conn_id)
    }

    /// Returns whether the given connection holds the host role.
    pub fn is_host(&self, conn_id: &str) -> bool {
        self.get(conn_id).map(|m| m.role == Role::Host) == Some(true)
    }

    /// Returns whether any member holds the host role.
    pub fn has_host(&self) -> bool {
        self.members.iter().any(|m| m.role == Role::Host)
    }

    /// Promotes the longest-connected guest to host.
    ///
    /// Caller must ensure the room currently has no host. Returns the
    /// promoted member's profile, or `None` if the room has no guests.
    pub fn promote_first_guest(&mut self) -> Option<&Member> {
        debug_assert!(!self.has_host());
        let member = self.members.first_mut()?;
        member.role = Role::Host;
        Some(&self.members[0])
    }

    /// Returns all members in join order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Returns the number of connected members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns whether the room has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserProfile {
        UserProfile {
            user_id: id.to_string(),
            display_name: format!("User {}", id),
            avatar_url: String::new(),
        }
    }

    #[test]
    fn first_host_keeps_role() {
        let mut presence = PresenceRegistry::new();
        let role = presence.add("c1".into(), user("u1"), Role::Host);
        assert_eq!(role, Role::Host);
        assert!(presence.has_host());
    }

    #[test]
    fn second_host_is_demoted_to_guest() {
        let mut presence = PresenceRegistry::new();
        presence.add("c1".into(), user("u1"), Role::Host);
        let role = presence.add("c2".into(), user("u2"), Role::Host);
        assert_eq!(role, Role::Guest);

        // Exactly one host at any instant
        let hosts = presence
            .members()
            .iter()
            .filter(|m| m.role == Role::Host)
            .count();
        assert_eq!(hosts, 1);
    }

    #[test]
    fn host_leaving_leaves_room_hostless() {
        let mut presence = PresenceRegistry::new();
        presence.add("c1".into(), user("u1"), Role::Host);
        presence.add("c2".into(), user("u2"), Role::Guest);

        let left = presence.remove("c1").unwrap();
        assert_eq!(left.role, Role::Host);
        assert!(!presence.has_host());
        assert_eq!(presence.len(), 1);
    }

    #[test]
    fn host_requested_after_host_left_is_granted() {
        let mut presence = PresenceRegistry::new();
        presence.add("c1".into(), user("u1"), Role::Host);
        presence.remove("c1");
        let role = presence.add("c2".into(), user("u2"), Role::Host);
        assert_eq!(role, Role::Host);
    }

    #[test]
    fn promote_first_guest_picks_longest_connected() {
        let mut presence = PresenceRegistry::new();
        presence.add("c1".into(), user("u1"), Role::Guest);
        presence.add("c2".into(), user("u2"), Role::Guest);

        let promoted = presence.promote_first_guest().unwrap();
        assert_eq!(promoted.user.user_id, "u1");
        assert!(presence.is_host("c1"));
    }

    #[test]
    fn member_serializes_with_flattened_user_and_role() {
        let member = Member {
            conn_id: "c1".into(),
            user: user("u1"),
            role: Role::Host,
        };
        let json = serde_json::to_value(&member).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["role"], "host");
        assert!(json.get("conn_id").is_none());
    }
}
