//! Room identity.
//!
//! Room id format:
//! - `general` - the public room everyone can see
//! - `room_<lo>_<hi>` - a 1:1 room, ids sorted ascending
//!
//! Both participants derive the same id on their own, no negotiation needed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::UserId;

const GENERAL: &str = "general";
const PEER_PREFIX: &str = "room_";
const SEPARATOR: char = '_';
const PLACEHOLDER: &str = "room_pending";

/// Identifier of a conversation scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// The reserved public room.
    pub fn general() -> Self {
        Self(GENERAL.to_string())
    }

    /// Reserved id used when a peer room can't be derived (one side unknown).
    pub fn placeholder() -> Self {
        Self(PLACEHOLDER.to_string())
    }

    /// Derive the 1:1 room shared by `a` and `b`. Order of arguments is irrelevant.
    pub fn between(a: &UserId, b: &UserId) -> Self {
        if a.is_empty() || b.is_empty() {
            return Self::placeholder();
        }

        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("{PEER_PREFIX}{lo}{SEPARATOR}{hi}"))
    }

    /// Room seen by `me` when viewing `peer`; `None` means the general room.
    pub fn for_peer(me: &UserId, peer: Option<&UserId>) -> Self {
        match peer {
            Some(peer) => Self::between(me, peer),
            None => Self::general(),
        }
    }

    /// Wrap a room id received over the wire.
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_general(&self) -> bool {
        self.0 == GENERAL
    }

    pub fn is_placeholder(&self) -> bool {
        self.0 == PLACEHOLDER
    }

    /// The two participants of a derived peer room.
    ///
    /// Returns `None` for the general room, the placeholder, and anything
    /// that wasn't produced by [`RoomId::between`].
    pub fn participants(&self) -> Option<(UserId, UserId)> {
        if self.is_placeholder() {
            return None;
        }
        let rest = self.0.strip_prefix(PEER_PREFIX)?;
        let (lo, hi) = rest.split_once(SEPARATOR)?;
        if lo.is_empty() || hi.is_empty() || lo > hi {
            return None;
        }
        Some((UserId::new(lo), UserId::new(hi)))
    }

    /// Whether `user` may read and post in this room.
    pub fn admits(&self, user: &UserId) -> bool {
        if self.is_general() {
            return true;
        }
        self.participants()
            .is_some_and(|(lo, hi)| &lo == user || &hi == user)
    }

    /// The other participant of a peer room, from `me`'s point of view.
    pub fn peer_of(&self, me: &UserId) -> Option<UserId> {
        let (lo, hi) = self.participants()?;
        if &lo == me {
            Some(hi)
        } else if &hi == me {
            Some(lo)
        } else {
            None
        }
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
