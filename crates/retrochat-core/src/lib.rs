//! Core types for the retrochat chatroom.
//!
//! This crate holds what client and server must agree on: how room ids are
//! derived, what users and messages look like, and the event vocabulary
//! exchanged over the socket.

mod identity;
mod message;
mod model;
mod room;

pub use identity::{
    JoinKind, StoredIdentity, USERNAME_MAX_CHARS, USERNAME_MIN_CHARS, UserId, Username,
};
pub use message::{ClientEvent, ServerEvent};
pub use model::{ChatMessage, DEFAULT_MAX_MESSAGE_CHARS, User, validate_message_text};
pub use room::RoomId;

/// Path prefix under which all chat traffic is served.
pub const CHAT_NAMESPACE: &str = "/chat";

/// Input rejected before it reaches shared state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("username cannot be empty")]
    EmptyUsername,
    #[error("username must be {min}-{max} characters, got {len}")]
    UsernameLength { len: usize, min: usize, max: usize },
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("message is {len} characters, limit is {max}")]
    MessageTooLong { len: usize, max: usize },
}

/// Client connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport.
    #[default]
    Disconnected,
    /// Establishing the transport.
    Connecting,
    /// Transport up, `joined_chatroom` not received yet.
    AwaitingJoin,
    /// Normal operation.
    Joined,
}

impl ConnectionState {
    /// Whether the transport is currently up.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::AwaitingJoin | Self::Joined)
    }
}
