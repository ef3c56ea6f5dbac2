use retrochat_core::{RoomId, UserId, ValidationError};
use thiserror::Error;

/// A client request the hub refused.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid username: {0}")]
    InvalidUsername(#[source] ValidationError),

    #[error("invalid message: {0}")]
    InvalidMessage(#[source] ValidationError),

    #[error("connection has not joined the chatroom")]
    NotJoined,

    #[error("{user} is not a member of {room}")]
    NotAMember { user: UserId, room: RoomId },

    #[error("no user {0} has ever joined")]
    UnknownPeer(UserId),
}

impl ChatError {
    /// Stable code sent to the client in `error` events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidUsername(_) => "invalid_username",
            Self::InvalidMessage(_) => "invalid_message",
            Self::NotJoined => "not_joined",
            Self::NotAMember { .. } => "not_a_member",
            Self::UnknownPeer(_) => "unknown_peer",
        }
    }
}

/// Failure loading server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}
