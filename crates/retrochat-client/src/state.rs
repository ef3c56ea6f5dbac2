//! Client chat state machine.
//!
//! `ChatState` does no I/O. The runtime feeds it [`Input`]s (socket
//! lifecycle, server events, user actions) and carries out the [`Effect`]s it
//! returns. Messages only ever enter the visible list through the server's
//! echo; sending clears the input box and nothing else.

use retrochat_core::{
    ChatMessage, ClientEvent, ConnectionState, DEFAULT_MAX_MESSAGE_CHARS, RoomId, ServerEvent,
    StoredIdentity, User, UserId, Username, ValidationError, validate_message_text,
};

/// Server error code that sends the user back to the username prompt.
const INVALID_USERNAME: &str = "invalid_username";

/// Everything that can happen to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// Startup, with whatever identity durable storage had.
    Mounted { stored: Option<StoredIdentity> },
    Connecting,
    Connected,
    Disconnected,
    Server(ServerEvent),
    SubmitUsername(String),
    /// `None` selects the general room.
    SelectPeer(Option<UserId>),
    EditInput(String),
    Send,
}

/// Work the runtime must carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Emit(ClientEvent),
    PersistIdentity(StoredIdentity),
    PromptUsername,
    FocusInput,
    ScrollToBottom,
    Rejected(Rejection),
}

/// Why a user action went nowhere.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("{0}")]
    Invalid(#[from] ValidationError),
    #[error("not connected")]
    NotConnected,
    #[error("pick a username first")]
    UsernameRequired,
    #[error("server said no ({code}): {message}")]
    Server { code: String, message: String },
}

/// Which room the user is looking at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Viewing {
    #[default]
    General,
    Peer(UserId),
}

impl Viewing {
    fn from_peer(peer: Option<UserId>) -> Self {
        match peer {
            Some(peer) => Self::Peer(peer),
            None => Self::General,
        }
    }

    pub fn peer(&self) -> Option<&UserId> {
        match self {
            Self::General => None,
            Self::Peer(id) => Some(id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatState {
    connection: ConnectionState,
    identity: Option<StoredIdentity>,
    /// Username picked at the prompt, not yet confirmed by the server.
    pending_username: Option<Username>,
    prompting: bool,
    join_sent: bool,
    viewing: Viewing,
    room_id: RoomId,
    /// A `select_user` is in flight; the message list is empty until its
    /// history arrives.
    awaiting_history: bool,
    users: Vec<User>,
    messages: Vec<ChatMessage>,
    input: String,
    max_message_chars: usize,
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatState {
    pub fn new() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            identity: None,
            pending_username: None,
            prompting: false,
            join_sent: false,
            viewing: Viewing::General,
            room_id: RoomId::general(),
            awaiting_history: false,
            users: Vec::new(),
            messages: Vec::new(),
            input: String::new(),
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }

    /// Refuse messages longer than `max` characters before they are sent.
    pub fn with_max_message_chars(mut self, max: usize) -> Self {
        self.max_message_chars = max;
        self
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn identity(&self) -> Option<&StoredIdentity> {
        self.identity.as_ref()
    }

    pub fn is_prompting(&self) -> bool {
        self.prompting
    }

    pub fn viewing(&self) -> &Viewing {
        &self.viewing
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn is_awaiting_history(&self) -> bool {
        self.awaiting_history
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Whether the send button should be enabled.
    pub fn can_send(&self) -> bool {
        self.connection == ConnectionState::Joined
            && !self.prompting
            && !self.input.trim().is_empty()
    }

    pub fn user(&self, id: &UserId) -> Option<&User> {
        self.users.iter().find(|u| &u.id == id)
    }

    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        match input {
            Input::Mounted { stored } => self.on_mounted(stored),
            Input::Connecting => {
                self.connection = ConnectionState::Connecting;
                self.join_sent = false;
                Vec::new()
            }
            Input::Connected => {
                self.connection = ConnectionState::AwaitingJoin;
                self.join_sent = false;
                self.try_join()
            }
            Input::Disconnected => {
                // Keep users and messages around for a seamless reconnect.
                self.connection = ConnectionState::Disconnected;
                self.join_sent = false;
                Vec::new()
            }
            Input::Server(event) => self.on_server(event),
            Input::SubmitUsername(name) => self.on_submit_username(&name),
            Input::SelectPeer(peer) => self.on_select(peer),
            Input::EditInput(text) => {
                self.input = text;
                Vec::new()
            }
            Input::Send => self.on_send(),
        }
    }

    fn on_mounted(&mut self, stored: Option<StoredIdentity>) -> Vec<Effect> {
        self.identity = stored;
        if self.identity.is_some() {
            return Vec::new();
        }
        self.prompting = true;
        vec![Effect::PromptUsername]
    }

    fn on_submit_username(&mut self, name: &str) -> Vec<Effect> {
        if !self.prompting {
            return Vec::new();
        }
        match Username::parse(name) {
            Ok(name) => {
                self.prompting = false;
                self.pending_username = Some(name);
                self.try_join()
            }
            Err(e) => vec![Effect::Rejected(e.into())],
        }
    }

    /// Emit the single `join_chatroom` this connection is allowed, if we
    /// know enough to send it.
    fn try_join(&mut self) -> Vec<Effect> {
        if self.connection != ConnectionState::AwaitingJoin || self.join_sent || self.prompting {
            return Vec::new();
        }

        let user_id = self.identity.as_ref().map(|i| i.id.clone());
        let username = match (&self.pending_username, &self.identity) {
            (Some(name), _) => name.clone(),
            (None, Some(identity)) => identity.username.clone(),
            (None, None) => return Vec::new(),
        };

        self.join_sent = true;
        vec![Effect::Emit(ClientEvent::JoinChatroom {
            user_id,
            username: username.to_string(),
        })]
    }

    fn guard_interaction(&self) -> Result<(), Rejection> {
        if self.prompting {
            return Err(Rejection::UsernameRequired);
        }
        if self.connection != ConnectionState::Joined {
            return Err(Rejection::NotConnected);
        }
        Ok(())
    }

    fn on_select(&mut self, peer: Option<UserId>) -> Vec<Effect> {
        if let Err(rejection) = self.guard_interaction() {
            return vec![Effect::Rejected(rejection)];
        }
        let Some(me) = self.identity.as_ref().map(|i| i.id.clone()) else {
            return vec![Effect::Rejected(Rejection::NotConnected)];
        };
        let peer = peer.filter(|p| p != &me);

        if let Some(peer) = &peer {
            self.set_unread(peer, 0);
        }
        self.viewing = Viewing::from_peer(peer.clone());
        self.room_id = RoomId::for_peer(&me, peer.as_ref());
        self.messages.clear();
        self.awaiting_history = true;

        vec![Effect::Emit(ClientEvent::SelectUser { peer_id: peer })]
    }

    fn on_send(&mut self) -> Vec<Effect> {
        if let Err(rejection) = self.guard_interaction() {
            return vec![Effect::Rejected(rejection)];
        }
        if let Err(e) = validate_message_text(&self.input, self.max_message_chars) {
            return vec![Effect::Rejected(e.into())];
        }

        let text = std::mem::take(&mut self.input);
        vec![Effect::Emit(ClientEvent::SendMessage {
            text,
            room_id: self.room_id.clone(),
        })]
    }

    fn on_server(&mut self, event: ServerEvent) -> Vec<Effect> {
        match event {
            ServerEvent::JoinedChatroom {
                id,
                username,
                selected_user,
                room_id,
                users,
                recent_messages,
            } => self.on_joined(id, &username, selected_user, room_id, users, recent_messages),
            ServerEvent::MessageReceived(message) => self.on_message(message),
            ServerEvent::MessageHistory {
                room_id,
                selected_user,
                recent_messages,
            } => {
                // A reply to an older selection the user already moved away from.
                if room_id != self.room_id {
                    return Vec::new();
                }
                if let Some(peer) = &selected_user {
                    self.set_unread(peer, 0);
                }
                self.viewing = Viewing::from_peer(selected_user);
                self.messages = sorted(recent_messages);
                self.awaiting_history = false;
                vec![Effect::ScrollToBottom]
            }
            ServerEvent::UserJoined(user) => {
                if self.identity.as_ref().is_some_and(|i| i.id == user.id) {
                    return Vec::new();
                }
                match self.users.iter_mut().find(|u| u.id == user.id) {
                    Some(existing) => *existing = user,
                    None => self.users.push(user),
                }
                Vec::new()
            }
            ServerEvent::UserLeft { id } => {
                if let Some(user) = self.users.iter_mut().find(|u| u.id == id) {
                    user.is_online = false;
                }
                Vec::new()
            }
            ServerEvent::Error { code, message } => {
                let mut effects = vec![Effect::Rejected(Rejection::Server {
                    code: code.clone(),
                    message,
                })];
                if code == INVALID_USERNAME {
                    self.prompting = true;
                    self.join_sent = false;
                    self.pending_username = None;
                    effects.push(Effect::PromptUsername);
                }
                effects
            }
        }
    }

    fn on_joined(
        &mut self,
        id: UserId,
        username: &str,
        selected_user: Option<UserId>,
        room_id: RoomId,
        users: Vec<User>,
        recent_messages: Vec<ChatMessage>,
    ) -> Vec<Effect> {
        let username = Username::parse(username)
            .ok()
            .or_else(|| self.pending_username.clone())
            .or_else(|| self.identity.as_ref().map(|i| i.username.clone()));
        let Some(username) = username else {
            tracing::warn!("Server confirmed join without a usable username");
            return Vec::new();
        };

        let identity = StoredIdentity { id, username };
        self.identity = Some(identity.clone());
        self.pending_username = None;
        self.connection = ConnectionState::Joined;
        self.viewing = Viewing::from_peer(selected_user);
        self.room_id = room_id;
        self.users = users;
        self.messages = sorted(recent_messages);
        self.awaiting_history = false;

        vec![
            Effect::PersistIdentity(identity),
            Effect::FocusInput,
            Effect::ScrollToBottom,
        ]
    }

    fn on_message(&mut self, message: ChatMessage) -> Vec<Effect> {
        if message.room_id == self.room_id {
            if self.awaiting_history {
                // The history that is on its way already contains it.
                return Vec::new();
            }
            if self.messages.iter().any(|m| m.id == message.id) {
                return Vec::new();
            }
            let pos = self.messages.partition_point(|m| m.seq <= message.seq);
            self.messages.insert(pos, message);
            return vec![Effect::ScrollToBottom];
        }

        // Someone wrote to us in a room we don't have open: badge it.
        let Some(me) = self.identity.as_ref().map(|i| &i.id) else {
            return Vec::new();
        };
        if message.sender_id != *me && message.room_id.peer_of(me).as_ref() == Some(&message.sender_id)
        {
            let sender = message.sender_id.clone();
            let count = self.user(&sender).map_or(0, |u| u.unread_count);
            self.set_unread(&sender, count + 1);
        }
        Vec::new()
    }

    fn set_unread(&mut self, peer: &UserId, count: u32) {
        if let Some(user) = self.users.iter_mut().find(|u| &u.id == peer) {
            user.unread_count = count;
        }
    }
}

fn sorted(mut messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    messages.sort_by_key(|m| m.seq);
    messages
}
