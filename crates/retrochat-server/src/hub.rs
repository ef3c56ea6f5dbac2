//! Chat hub: the one owner of presence, message log and live connections.
//!
//! The hub is driven one event at a time under a single lock. Every delivery
//! an event causes is pushed onto the recipients' outboxes before the next
//! event is looked at, so a connection always sees the snapshot for a room
//! before any live message for it.

use chrono::Utc;
use retrochat_core::{ChatMessage, ClientEvent, RoomId, ServerEvent, UserId, Username};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

use crate::config::ServerConfig;
use crate::error::ChatError;
use crate::presence::{PresenceRegistry, Selection};
use crate::store::MessageStore;

pub type ConnectionId = u64;

/// Queue of events waiting to be written to one socket.
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

pub type SharedHub = Arc<Mutex<ChatHub>>;

struct Connection {
    user: Option<UserId>,
    outbox: Outbox,
}

/// Counters reported by the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: &'static str,
    pub users_online: usize,
    pub users_known: usize,
    pub connections: usize,
    pub rooms: usize,
    pub messages: usize,
}

pub struct ChatHub {
    registry: PresenceRegistry,
    store: MessageStore,
    connections: HashMap<ConnectionId, Connection>,
    next_connection: ConnectionId,
    history_limit: usize,
}

impl ChatHub {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            registry: PresenceRegistry::new(),
            store: MessageStore::new(config.max_message_len),
            connections: HashMap::new(),
            next_connection: 1,
            history_limit: config.history_limit,
        }
    }

    pub fn shared(config: &ServerConfig) -> SharedHub {
        Arc::new(Mutex::new(Self::new(config)))
    }

    /// Register a new socket. It stays anonymous until it joins.
    pub fn connect(&mut self, outbox: Outbox) -> ConnectionId {
        let id = self.next_connection;
        self.next_connection += 1;
        self.connections.insert(id, Connection { user: None, outbox });
        id
    }

    /// Process one inbound event. Rejections are reported back to the sender
    /// as `error` events.
    pub fn handle(&mut self, conn: ConnectionId, event: ClientEvent) {
        let result = match event {
            ClientEvent::JoinChatroom { user_id, username } => self.join(conn, user_id, &username),
            ClientEvent::SendMessage { text, room_id } => self.send_message(conn, &text, &room_id),
            ClientEvent::SelectUser { peer_id } => self.select_user(conn, peer_id),
        };

        if let Err(err) = result {
            tracing::warn!("Rejected request on connection {}: {}", conn, err);
            self.deliver(
                conn,
                ServerEvent::Error {
                    code: err.code().to_string(),
                    message: err.to_string(),
                },
            );
        }
    }

    /// Drop a socket. The user goes offline once their last socket is gone.
    pub fn disconnect(&mut self, conn: ConnectionId) {
        let Some(connection) = self.connections.remove(&conn) else {
            return;
        };
        if let Some(user) = connection.user {
            self.release_user(&user);
        }
    }

    pub fn health(&self) -> Health {
        Health {
            status: "ok",
            users_online: self.registry.online_count(),
            users_known: self.registry.len(),
            connections: self.connections.len(),
            rooms: self.store.room_count(),
            messages: self.store.message_count(),
        }
    }

    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    fn join(
        &mut self,
        conn: ConnectionId,
        candidate: Option<UserId>,
        username: &str,
    ) -> Result<(), ChatError> {
        let username = Username::parse(username).map_err(ChatError::InvalidUsername)?;
        let now = Utc::now();

        // Same socket joining under a different identity: let go of the old one.
        let previous = self.user_of(conn);
        if let Some(previous) = previous.filter(|p| Some(p) != candidate.as_ref()) {
            if let Some(connection) = self.connections.get_mut(&conn) {
                connection.user = None;
            }
            self.release_user(&previous);
        }

        let outcome = self.registry.join(candidate.as_ref(), &username, now);
        match self.connections.get_mut(&conn) {
            Some(connection) => connection.user = Some(outcome.id.clone()),
            None => return Ok(()),
        }

        let restore = self.registry.selected_peer(&outcome.id);
        let (selection, recent_messages) = self.open_room(&outcome.id, restore);

        tracing::info!(
            "{} joined as {} ({:?}), viewing {}",
            outcome.username,
            outcome.id,
            outcome.kind,
            selection.room_id
        );

        self.deliver(
            conn,
            ServerEvent::JoinedChatroom {
                id: outcome.id.clone(),
                username: outcome.username.clone(),
                selected_user: selection.peer,
                room_id: selection.room_id,
                users: self.registry.list_users(&outcome.id),
                recent_messages,
            },
        );

        // Another tab of someone already online changes nothing for the others.
        if !outcome.came_online {
            return Ok(());
        }
        for (other_conn, other_user) in self.joined_connections() {
            if other_user == outcome.id {
                continue;
            }
            if let Some(user) = self.registry.user_for(&outcome.id, &other_user) {
                self.deliver(other_conn, ServerEvent::UserJoined(user));
            }
        }
        Ok(())
    }

    fn send_message(
        &mut self,
        conn: ConnectionId,
        text: &str,
        room_id: &RoomId,
    ) -> Result<(), ChatError> {
        let sender = self.user_of(conn).ok_or(ChatError::NotJoined)?;
        if !room_id.admits(&sender) {
            return Err(ChatError::NotAMember {
                user: sender,
                room: room_id.clone(),
            });
        }
        if let Some(peer) = room_id.peer_of(&sender) {
            self.require_known(&peer)?;
        }

        let now = Utc::now();
        let sender_name = self.registry.username(&sender).unwrap_or_default().to_string();
        let mut message = self
            .store
            .append(room_id, &sender, &sender_name, text, now)
            .map_err(ChatError::InvalidMessage)?;

        let recipients = self.recipients(room_id, &sender);

        let readers = recipients
            .iter()
            .filter(|u| **u != sender && self.registry.is_viewing(u, room_id))
            .count();
        for _ in 0..readers {
            if let Some(count) = self.store.increment_read_count(&message.id) {
                message.read_count = count;
            }
        }

        if let Some(peer) = room_id.peer_of(&sender) {
            if !self.registry.is_viewing(&peer, room_id) {
                if let Some(unread) = self.registry.increment_unread(&peer, &sender) {
                    tracing::debug!("{} has {} unread from {}", peer, unread, sender);
                }
            }
        }

        tracing::debug!("Message {} in {} (seq {})", message.id, room_id, message.seq);
        self.deliver_to_users(&recipients, &ServerEvent::MessageReceived(message));
        Ok(())
    }

    fn select_user(&mut self, conn: ConnectionId, peer: Option<UserId>) -> Result<(), ChatError> {
        let user = self.user_of(conn).ok_or(ChatError::NotJoined)?;
        if let Some(peer) = peer.as_ref().filter(|p| **p != user) {
            self.require_known(peer)?;
        }
        let (selection, recent_messages) = self.open_room(&user, peer);

        tracing::debug!(
            "{} now viewing {} ({} unread cleared)",
            user,
            selection.room_id,
            selection.cleared
        );

        self.deliver(
            conn,
            ServerEvent::MessageHistory {
                room_id: selection.room_id,
                selected_user: selection.peer,
                recent_messages,
            },
        );
        Ok(())
    }

    /// Point `user` at a room, mark what they just caught up on as read, and
    /// return that room's backlog.
    fn open_room(&mut self, user: &UserId, peer: Option<UserId>) -> (Selection, Vec<ChatMessage>) {
        let selection = self.registry.select_peer(user, peer, Utc::now());

        if let Some(peer) = selection.peer.as_ref().filter(|_| selection.cleared > 0) {
            let caught_up =
                self.store
                    .latest_from(&selection.room_id, peer, selection.cleared as usize);
            for id in caught_up {
                self.store.increment_read_count(&id);
            }
        }

        let history = self.store.history(&selection.room_id, self.history_limit);
        (selection, history)
    }

    /// Users whose sockets get a live copy of a message in `room_id`.
    ///
    /// Peer rooms go to both participants whatever they are viewing; the
    /// general room goes to whoever has it open, plus the sender's own echo.
    fn recipients(&self, room_id: &RoomId, sender: &UserId) -> Vec<UserId> {
        if let Some((lo, hi)) = room_id.participants() {
            return if lo == hi { vec![lo] } else { vec![lo, hi] };
        }

        let mut users: Vec<UserId> = self
            .registry
            .online_users()
            .filter(|u| self.registry.is_viewing(u, room_id))
            .cloned()
            .collect();
        if !users.contains(sender) {
            users.push(sender.clone());
        }
        users
    }

    /// Called when a socket stops speaking for `user`.
    fn release_user(&mut self, user: &UserId) {
        let still_connected = self
            .connections
            .values()
            .any(|c| c.user.as_ref() == Some(user));
        if still_connected || !self.registry.disconnect(user) {
            return;
        }

        tracing::info!("{} went offline", user);
        let event = ServerEvent::UserLeft { id: user.clone() };
        for (conn, _) in self.joined_connections() {
            self.deliver(conn, event.clone());
        }
    }

    /// Peers are only ever addressed by ids the registry handed out.
    fn require_known(&self, peer: &UserId) -> Result<(), ChatError> {
        if self.registry.contains(peer) {
            Ok(())
        } else {
            Err(ChatError::UnknownPeer(peer.clone()))
        }
    }

    fn user_of(&self, conn: ConnectionId) -> Option<UserId> {
        self.connections.get(&conn).and_then(|c| c.user.clone())
    }

    fn joined_connections(&self) -> Vec<(ConnectionId, UserId)> {
        self.connections
            .iter()
            .filter_map(|(id, c)| c.user.clone().map(|u| (*id, u)))
            .collect()
    }

    /// Best effort: a closed outbox only loses that one recipient.
    fn deliver(&self, conn: ConnectionId, event: ServerEvent) {
        let Some(connection) = self.connections.get(&conn) else {
            return;
        };
        let name = event.name();
        if connection.outbox.send(event).is_err() {
            tracing::debug!("Dropped {} for closed connection {}", name, conn);
        }
    }

    fn deliver_to_users(&self, users: &[UserId], event: &ServerEvent) {
        for (conn, user) in self.joined_connections() {
            if users.contains(&user) {
                self.deliver(conn, event.clone());
            }
        }
    }
}
