//! Protocol messages.
//!
//! Every frame is a JSON object tagged with `type`, the event name. Payload
//! fields sit beside the tag in camelCase.

use serde::{Deserialize, Serialize};

use crate::{ChatMessage, RoomId, User, UserId};

/// Events sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Enter the chatroom. A known `user_id` resumes that identity.
    #[serde(rename_all = "camelCase")]
    JoinChatroom {
        #[serde(default)]
        user_id: Option<UserId>,
        username: String,
    },
    /// Post to a room the sender belongs to.
    #[serde(rename_all = "camelCase")]
    SendMessage { text: String, room_id: RoomId },
    /// Switch the viewed room. `None` selects the general room.
    #[serde(rename_all = "camelCase")]
    SelectUser {
        #[serde(default)]
        peer_id: Option<UserId>,
    },
}

/// Events sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Join accepted. Sent once, before anything else on the connection.
    #[serde(rename_all = "camelCase")]
    JoinedChatroom {
        id: UserId,
        username: String,
        selected_user: Option<UserId>,
        room_id: RoomId,
        users: Vec<User>,
        recent_messages: Vec<ChatMessage>,
    },
    /// A message was appended to a room the recipient belongs to.
    MessageReceived(ChatMessage),
    /// Backlog for the room just selected.
    #[serde(rename_all = "camelCase")]
    MessageHistory {
        room_id: RoomId,
        selected_user: Option<UserId>,
        recent_messages: Vec<ChatMessage>,
    },
    /// A user joined or came back online.
    UserJoined(User),
    /// A user went offline.
    UserLeft { id: UserId },
    /// A request was rejected.
    Error { code: String, message: String },
}

impl ServerEvent {
    /// Event name as it appears in the `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinedChatroom { .. } => "joined_chatroom",
            Self::MessageReceived(_) => "message_received",
            Self::MessageHistory { .. } => "message_history",
            Self::UserJoined(_) => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_without_id() {
        let event: ClientEvent =
            serde_json::from_value(json!({"type": "join_chatroom", "username": "Zoe"})).unwrap();
        assert_eq!(
            event,
            ClientEvent::JoinChatroom {
                user_id: None,
                username: "Zoe".into()
            }
        );
    }

    #[test]
    fn select_general_is_null_peer() {
        let json = serde_json::to_value(ClientEvent::SelectUser { peer_id: None }).unwrap();
        assert_eq!(json, json!({"type": "select_user", "peerId": null}));
    }

    #[test]
    fn send_message_shape() {
        let json = serde_json::to_value(ClientEvent::SendMessage {
            text: "hi".into(),
            room_id: RoomId::general(),
        })
        .unwrap();
        assert_eq!(
            json,
            json!({"type": "send_message", "text": "hi", "roomId": "general"})
        );
    }

    #[test]
    fn message_received_is_flat() {
        let event: ServerEvent = serde_json::from_value(json!({
            "type": "message_received",
            "id": "m1",
            "message": "hi",
            "timestamp": "2024-05-01T12:00:00Z",
            "roomId": "room_u1_u2",
            "senderId": "u2",
            "readCount": 0
        }))
        .unwrap();
        let ServerEvent::MessageReceived(msg) = event else {
            panic!("wrong variant");
        };
        assert_eq!(msg.text, "hi");
        assert_eq!(msg.sender_id, UserId::new("u2"));
        assert_eq!(msg.seq, 0);
    }

    #[test]
    fn user_left_shape() {
        let event = ServerEvent::UserLeft { id: UserId::new("u2") };
        assert_eq!(event.name(), "user_left");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "user_left", "id": "u2"})
        );
    }
}
