//! Client runtime: owns the socket, drives [`ChatState`], reconnects.

use futures_util::{Sink, SinkExt, StreamExt};
use retrochat_core::{ClientEvent, ServerEvent, UserId};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::state::{ChatState, Effect, Input};
use crate::storage::IdentityStore;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Things a user can do from the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    SubmitUsername(String),
    SelectPeer(Option<UserId>),
    EditInput(String),
    Send,
}

impl From<UserAction> for Input {
    fn from(action: UserAction) -> Self {
        match action {
            UserAction::SubmitUsername(name) => Input::SubmitUsername(name),
            UserAction::SelectPeer(peer) => Input::SelectPeer(peer),
            UserAction::EditInput(text) => Input::EditInput(text),
            UserAction::Send => Input::Send,
        }
    }
}

/// Front-end side of a running client.
///
/// Dropping `actions` shuts the client down.
pub struct ClientHandle {
    pub actions: mpsc::UnboundedSender<UserAction>,
    pub view: watch::Receiver<ChatState>,
    pub effects: mpsc::UnboundedReceiver<Effect>,
}

enum SessionEnd {
    /// The front-end went away.
    Quit,
    /// The server closed the socket.
    Dropped,
}

pub struct ChatClient {
    config: ClientConfig,
    store: IdentityStore,
    state: ChatState,
    actions: mpsc::UnboundedReceiver<UserAction>,
    view: watch::Sender<ChatState>,
    effects: mpsc::UnboundedSender<Effect>,
}

impl ChatClient {
    pub fn new(config: ClientConfig, store: IdentityStore) -> (Self, ClientHandle) {
        let (actions_tx, actions) = mpsc::unbounded_channel();
        let (effects, effects_rx) = mpsc::unbounded_channel();
        let state = ChatState::new().with_max_message_chars(config.max_message_chars);
        let (view, view_rx) = watch::channel(state.clone());

        let client = Self {
            config,
            store,
            state,
            actions,
            view,
            effects,
        };
        let handle = ClientHandle {
            actions: actions_tx,
            view: view_rx,
            effects: effects_rx,
        };
        (client, handle)
    }

    /// Run until the front-end drops its action sender.
    pub async fn run(mut self) -> Result<(), ClientError> {
        let stored = self.store.load()?;
        self.dispatch_offline(Input::Mounted { stored });

        let mut attempt: u32 = 0;
        loop {
            self.dispatch_offline(Input::Connecting);

            match self.connect().await {
                Ok(socket) => {
                    attempt = 0;
                    tracing::info!("Connected to {}", self.config.url);
                    match self.session(socket).await {
                        Ok(SessionEnd::Quit) => return Ok(()),
                        Ok(SessionEnd::Dropped) => tracing::info!("Server closed the connection"),
                        Err(e) => tracing::warn!("Connection lost: {}", e),
                    }
                }
                Err(e) => tracing::warn!("Could not connect to {}: {}", self.config.url, e),
            }

            self.dispatch_offline(Input::Disconnected);

            let delay = self.config.backoff(attempt);
            attempt = attempt.saturating_add(1);
            tracing::debug!("Reconnecting in {:?}", delay);
            if self.wait_offline(delay).await {
                return Ok(());
            }
        }
    }

    async fn connect(&self) -> Result<Socket, ClientError> {
        let attempt = tokio_tungstenite::connect_async(self.config.url.as_str());
        match tokio::time::timeout(self.config.connect_timeout, attempt).await {
            Ok(Ok((socket, _response))) => Ok(socket),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ClientError::Timeout(self.config.connect_timeout)),
        }
    }

    async fn session(&mut self, socket: Socket) -> Result<SessionEnd, ClientError> {
        let (mut sink, mut stream) = socket.split();

        let emits = self.dispatch(Input::Connected);
        send_all(&mut sink, emits).await?;

        loop {
            tokio::select! {
                frame = stream.next() => {
                    let emits = match frame {
                        Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(event) => {
                                tracing::debug!("<- {}", event.name());
                                self.dispatch(Input::Server(event))
                            }
                            Err(e) => {
                                tracing::warn!("Ignoring malformed server frame: {}", e);
                                continue;
                            }
                        },
                        Some(Ok(Message::Close(_))) | None => return Ok(SessionEnd::Dropped),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                    };
                    send_all(&mut sink, emits).await?;
                }
                action = self.actions.recv() => {
                    let Some(action) = action else {
                        let _ = sink.close().await;
                        return Ok(SessionEnd::Quit);
                    };
                    let emits = self.dispatch(action.into());
                    send_all(&mut sink, emits).await?;
                }
            }
        }
    }

    /// Sleep before the next attempt while still answering the front-end.
    /// Returns `true` if the front-end quit meanwhile.
    async fn wait_offline(&mut self, delay: std::time::Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return false,
                action = self.actions.recv() => match action {
                    Some(action) => self.dispatch_offline(action.into()),
                    None => return true,
                },
            }
        }
    }

    /// Feed the state machine, carry out local effects, return what must go
    /// over the wire.
    fn dispatch(&mut self, input: Input) -> Vec<ClientEvent> {
        let mut emits = Vec::new();
        for effect in self.state.handle(input) {
            match effect {
                Effect::Emit(event) => emits.push(event),
                Effect::PersistIdentity(identity) => {
                    if let Err(e) = self.store.save(&identity) {
                        tracing::warn!("Could not save identity: {}", e);
                    }
                }
                other => {
                    let _ = self.effects.send(other);
                }
            }
        }
        self.view.send_replace(self.state.clone());
        emits
    }

    fn dispatch_offline(&mut self, input: Input) {
        let emits = self.dispatch(input);
        if !emits.is_empty() {
            tracing::debug!("Dropped {} events while offline", emits.len());
        }
    }
}

async fn send_all<S>(sink: &mut S, events: Vec<ClientEvent>) -> Result<(), ClientError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    for event in events {
        let text = serde_json::to_string(&event)?;
        sink.send(Message::Text(text.into())).await?;
    }
    Ok(())
}
