//! Presence registry.
//!
//! Tracks every user that ever joined during this server's lifetime. Records
//! are never removed: a disconnect only flips the user offline, so unread
//! counters and the last selected room survive a reconnect.

use chrono::{DateTime, Utc};
use retrochat_core::{JoinKind, RoomId, User, UserId, Username};
use std::collections::HashMap;

/// Name given to records created for ids the registry has never seen.
const GUEST_NAME: &str = "guest";

struct UserRecord {
    id: UserId,
    username: String,
    is_online: bool,
    joined_at: DateTime<Utc>,
    /// Peer this user is looking at; `None` is the general room.
    viewing: Option<UserId>,
    /// Messages from each peer not yet seen by this user.
    unread: HashMap<UserId, u32>,
}

impl UserRecord {
    fn new(id: UserId, username: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            username,
            is_online: true,
            joined_at: now,
            viewing: None,
            unread: HashMap::new(),
        }
    }

    fn viewing_room(&self) -> RoomId {
        RoomId::for_peer(&self.id, self.viewing.as_ref())
    }
}

/// Result of a join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub id: UserId,
    pub username: String,
    pub kind: JoinKind,
    /// Whether the user was offline (or unknown) before this join.
    pub came_online: bool,
}

/// Result of selecting a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub room_id: RoomId,
    pub peer: Option<UserId>,
    /// Unread counter for `peer` before it was reset.
    pub cleared: u32,
}

#[derive(Default)]
pub struct PresenceRegistry {
    users: HashMap<UserId, UserRecord>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user, or bring a known one back online.
    ///
    /// An unknown `candidate` is treated the same as no candidate: a new id
    /// is minted.
    pub fn join(
        &mut self,
        candidate: Option<&UserId>,
        username: &Username,
        now: DateTime<Utc>,
    ) -> JoinOutcome {
        if let Some(record) = candidate.and_then(|id| self.users.get_mut(id)) {
            let came_online = !record.is_online;
            record.is_online = true;
            record.username = username.to_string();
            return JoinOutcome {
                id: record.id.clone(),
                username: record.username.clone(),
                kind: JoinKind::Returning,
                came_online,
            };
        }

        let id = UserId::generate();
        let record = UserRecord::new(id.clone(), username.to_string(), now);
        self.users.insert(id.clone(), record);
        JoinOutcome {
            id,
            username: username.to_string(),
            kind: JoinKind::Fresh,
            came_online: true,
        }
    }

    /// Mark a user offline. Returns `true` if they were online.
    pub fn disconnect(&mut self, id: &UserId) -> bool {
        match self.users.get_mut(id) {
            Some(record) => std::mem::replace(&mut record.is_online, false),
            None => false,
        }
    }

    /// Everyone except `viewer`, with unread counts from `viewer`'s side.
    pub fn list_users(&self, viewer: &UserId) -> Vec<User> {
        let mut users: Vec<User> = self
            .users
            .values()
            .filter(|r| &r.id != viewer)
            .map(|r| self.view_of(r, viewer))
            .collect();
        users.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.id.cmp(&b.id)));
        users
    }

    /// One user's record as seen by `viewer`.
    pub fn user_for(&self, id: &UserId, viewer: &UserId) -> Option<User> {
        self.users.get(id).map(|r| self.view_of(r, viewer))
    }

    fn view_of(&self, record: &UserRecord, viewer: &UserId) -> User {
        User {
            id: record.id.clone(),
            username: record.username.clone(),
            is_online: record.is_online,
            joined_at: record.joined_at,
            unread_count: self.unread(viewer, &record.id),
        }
    }

    /// Record which room `user` is looking at and reset the unread counter
    /// for that peer.
    pub fn select_peer(&mut self, user: &UserId, peer: Option<UserId>, now: DateTime<Utc>) -> Selection {
        // Yourself or someone who never joined: fall back to the general room.
        let peer = peer.filter(|p| p != user && self.users.contains_key(p));
        let record = self.record_or_guest(user, now);

        let cleared = peer
            .as_ref()
            .and_then(|p| record.unread.remove(p))
            .unwrap_or(0);
        record.viewing = peer.clone();

        Selection {
            room_id: record.viewing_room(),
            peer,
            cleared,
        }
    }

    /// Peer `user` last selected, if any.
    pub fn selected_peer(&self, user: &UserId) -> Option<UserId> {
        self.users.get(user).and_then(|r| r.viewing.clone())
    }

    /// Whether `user` is online and has `room` open.
    pub fn is_viewing(&self, user: &UserId, room: &RoomId) -> bool {
        self.users
            .get(user)
            .is_some_and(|r| r.is_online && &r.viewing_room() == room)
    }

    /// Bump `viewer`'s unread counter for messages from `peer`. Returns the
    /// new count, or `None` if `viewer` never joined.
    pub fn increment_unread(&mut self, viewer: &UserId, peer: &UserId) -> Option<u32> {
        let record = self.users.get_mut(viewer)?;
        let count = record.unread.entry(peer.clone()).or_insert(0);
        *count += 1;
        Some(*count)
    }

    pub fn unread(&self, viewer: &UserId, peer: &UserId) -> u32 {
        self.users
            .get(viewer)
            .and_then(|r| r.unread.get(peer))
            .copied()
            .unwrap_or(0)
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.users.get(user).is_some_and(|r| r.is_online)
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.users.contains_key(user)
    }

    pub fn username(&self, user: &UserId) -> Option<&str> {
        self.users.get(user).map(|r| r.username.as_str())
    }

    /// Ids of every online user.
    pub fn online_users(&self) -> impl Iterator<Item = &UserId> {
        self.users.values().filter(|r| r.is_online).map(|r| &r.id)
    }

    pub fn online_count(&self) -> usize {
        self.users.values().filter(|r| r.is_online).count()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Selecting on an id nobody joined with creates a guest record instead
    /// of failing. Only the acting user's own id ever gets here.
    fn record_or_guest(&mut self, id: &UserId, now: DateTime<Utc>) -> &mut UserRecord {
        self.users.entry(id.clone()).or_insert_with(|| {
            tracing::debug!("Unknown user {}, registering as guest", id);
            // No socket backs a guest, so nothing would ever take it offline.
            let mut record = UserRecord::new(id.clone(), GUEST_NAME.to_string(), now);
            record.is_online = false;
            record
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Username {
        Username::parse(s).unwrap()
    }

    #[test]
    fn fresh_join_mints_id() {
        let mut reg = PresenceRegistry::new();
        let out = reg.join(None, &name("Zoe"), Utc::now());
        assert_eq!(out.kind, JoinKind::Fresh);
        assert!(out.came_online);
        assert!(reg.is_online(&out.id));
    }

    #[test]
    fn unknown_candidate_is_fresh() {
        let mut reg = PresenceRegistry::new();
        let stale = UserId::new("stale-id");
        let out = reg.join(Some(&stale), &name("Zoe"), Utc::now());
        assert_eq!(out.kind, JoinKind::Fresh);
        assert_ne!(out.id, stale);
    }

    #[test]
    fn returning_join_keeps_id_and_unread() {
        let mut reg = PresenceRegistry::new();
        let now = Utc::now();
        let zoe = reg.join(None, &name("Zoe"), now).id;
        let max = reg.join(None, &name("Max"), now).id;

        reg.increment_unread(&zoe, &max);
        reg.increment_unread(&zoe, &max);
        assert!(reg.disconnect(&zoe));
        assert!(!reg.is_online(&zoe));
        assert_eq!(reg.unread(&zoe, &max), 2);

        let back = reg.join(Some(&zoe), &name("Zoe"), now);
        assert_eq!(back.kind, JoinKind::Returning);
        assert_eq!(back.id, zoe);
        assert!(back.came_online);
        assert_eq!(reg.unread(&zoe, &max), 2);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn disconnect_twice() {
        let mut reg = PresenceRegistry::new();
        let zoe = reg.join(None, &name("Zoe"), Utc::now()).id;
        assert!(reg.disconnect(&zoe));
        assert!(!reg.disconnect(&zoe));
        assert!(!reg.disconnect(&UserId::new("nobody")));
    }

    #[test]
    fn list_excludes_viewer_and_scopes_unread() {
        let mut reg = PresenceRegistry::new();
        let now = Utc::now();
        let zoe = reg.join(None, &name("Zoe"), now).id;
        let max = reg.join(None, &name("Max"), now).id;
        let ann = reg.join(None, &name("Ann"), now).id;
        reg.increment_unread(&zoe, &max);

        let seen_by_zoe = reg.list_users(&zoe);
        assert_eq!(seen_by_zoe.len(), 2);
        assert!(seen_by_zoe.iter().all(|u| u.id != zoe));
        let max_entry = seen_by_zoe.iter().find(|u| u.id == max).unwrap();
        assert_eq!(max_entry.unread_count, 1);

        let seen_by_ann = reg.list_users(&ann);
        let max_entry = seen_by_ann.iter().find(|u| u.id == max).unwrap();
        assert_eq!(max_entry.unread_count, 0);
    }

    #[test]
    fn select_resets_unread_for_that_peer_only() {
        let mut reg = PresenceRegistry::new();
        let now = Utc::now();
        let zoe = reg.join(None, &name("Zoe"), now).id;
        let max = reg.join(None, &name("Max"), now).id;
        let ann = reg.join(None, &name("Ann"), now).id;
        for _ in 0..3 {
            reg.increment_unread(&zoe, &max);
        }
        reg.increment_unread(&zoe, &ann);

        let sel = reg.select_peer(&zoe, Some(max.clone()), now);
        assert_eq!(sel.room_id, RoomId::between(&zoe, &max));
        assert_eq!(sel.cleared, 3);
        assert_eq!(reg.unread(&zoe, &max), 0);
        assert_eq!(reg.unread(&zoe, &ann), 1);
        assert!(reg.is_viewing(&zoe, &sel.room_id));
        assert_eq!(reg.selected_peer(&zoe), Some(max));
    }

    #[test]
    fn select_none_is_general() {
        let mut reg = PresenceRegistry::new();
        let now = Utc::now();
        let zoe = reg.join(None, &name("Zoe"), now).id;
        let sel = reg.select_peer(&zoe, None, now);
        assert_eq!(sel.room_id, RoomId::general());
        assert!(reg.is_viewing(&zoe, &RoomId::general()));
    }

    #[test]
    fn select_self_is_general() {
        let mut reg = PresenceRegistry::new();
        let now = Utc::now();
        let zoe = reg.join(None, &name("Zoe"), now).id;
        let sel = reg.select_peer(&zoe, Some(zoe.clone()), now);
        assert_eq!(sel.room_id, RoomId::general());
        assert_eq!(sel.peer, None);
    }

    #[test]
    fn unknown_user_fails_open() {
        let mut reg = PresenceRegistry::new();
        let ghost = UserId::new("ghost");
        let sel = reg.select_peer(&ghost, None, Utc::now());
        assert_eq!(sel.room_id, RoomId::general());
        assert!(reg.contains(&ghost));
        assert_eq!(reg.username(&ghost), Some(GUEST_NAME));
        assert!(!reg.is_online(&ghost));
        assert_eq!(reg.online_count(), 0);
    }

    #[test]
    fn unread_for_unknown_viewer_is_dropped() {
        let mut reg = PresenceRegistry::new();
        let zoe = reg.join(None, &name("Zoe"), Utc::now()).id;
        let ghost = UserId::new("never-joined");

        assert_eq!(reg.increment_unread(&ghost, &zoe), None);
        assert!(!reg.contains(&ghost));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.increment_unread(&zoe, &ghost), Some(1));
    }

    #[test]
    fn select_unknown_peer_is_general() {
        let mut reg = PresenceRegistry::new();
        let now = Utc::now();
        let zoe = reg.join(None, &name("Zoe"), now).id;
        let sel = reg.select_peer(&zoe, Some(UserId::new("never-joined")), now);
        assert_eq!(sel.room_id, RoomId::general());
        assert_eq!(sel.peer, None);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn offline_user_is_not_viewing() {
        let mut reg = PresenceRegistry::new();
        let now = Utc::now();
        let zoe = reg.join(None, &name("Zoe"), now).id;
        reg.disconnect(&zoe);
        assert!(!reg.is_viewing(&zoe, &RoomId::general()));
        assert_eq!(reg.online_count(), 0);
    }
}
