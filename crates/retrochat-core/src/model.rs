//! Presence records and chat messages as they travel over the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{RoomId, UserId, ValidationError};

/// Default upper bound for message text, in characters.
pub const DEFAULT_MAX_MESSAGE_CHARS: usize = 2000;

/// A user's presence, as seen by one particular viewer.
///
/// `unread_count` is scoped to the viewer: it counts messages this user sent
/// to the viewer while the viewer was looking elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub is_online: bool,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub unread_count: u32,
}

/// A message in a room's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub room_id: RoomId,
    pub sender_id: UserId,
    #[serde(default)]
    pub sender_name: String,
    #[serde(rename = "message")]
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Position in the room's log, starting at 1.
    #[serde(default)]
    pub seq: u64,
    #[serde(default)]
    pub read_count: u32,
}

/// Check message text before it is sent or stored.
pub fn validate_message_text(text: &str, max_chars: usize) -> Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    let len = text.chars().count();
    if len > max_chars {
        return Err(ValidationError::MessageTooLong { len, max: max_chars });
    }
    Ok(())
}
