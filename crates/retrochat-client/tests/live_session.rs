use std::path::Path;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use retrochat_client::{
    ChatClient, ChatState, ClientConfig, ClientError, ClientHandle, Effect, IdentityStore,
    UserAction,
};
use retrochat_core::{ClientEvent, ConnectionState, RoomId, ServerEvent, UserId};
use retrochat_server::{ChatHub, ServerConfig};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{WebSocketStream, tungstenite::Message};

fn start(url: &str, dir: &Path) -> (ClientHandle, JoinHandle<Result<(), ClientError>>) {
    let config = ClientConfig {
        url: url.to_string(),
        connect_timeout: Duration::from_secs(2),
        backoff_initial: Duration::from_millis(10),
        backoff_max: Duration::from_millis(50),
        ..ClientConfig::default()
    };
    let (client, handle) = ChatClient::new(config, IdentityStore::in_dir(dir));
    (handle, tokio::spawn(client.run()))
}

async fn until_joined(view: &mut watch::Receiver<ChatState>) -> ChatState {
    tokio::time::timeout(
        Duration::from_secs(5),
        view.wait_for(|s| s.connection() == ConnectionState::Joined),
    )
    .await
    .expect("timed out waiting to join")
    .unwrap()
    .clone()
}

#[tokio::test]
async fn identity_survives_client_restart() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/chat/ws", listener.local_addr().unwrap());
    let hub = ChatHub::shared(&ServerConfig::default());
    tokio::spawn(retrochat_server::serve(listener, hub.clone(), std::future::pending()));
    let dir = tempfile::tempdir().unwrap();

    let (mut handle, task) = start(&url, dir.path());
    assert_eq!(handle.effects.recv().await, Some(Effect::PromptUsername));
    handle
        .actions
        .send(UserAction::SubmitUsername("Zoe".into()))
        .unwrap();

    let state = until_joined(&mut handle.view).await;
    let identity = state.identity().unwrap().clone();
    assert_eq!(identity.username.to_string(), "Zoe");
    assert_eq!(state.room_id(), &RoomId::general());

    let saved = IdentityStore::in_dir(dir.path()).load().unwrap();
    assert_eq!(saved, Some(identity.clone()));

    drop(handle.actions);
    task.await.unwrap().unwrap();

    // Second run: the saved identity joins without asking for a name.
    let (mut handle, task) = start(&url, dir.path());
    let state = until_joined(&mut handle.view).await;
    assert_eq!(state.identity().map(|i| &i.id), Some(&identity.id));
    while let Ok(effect) = handle.effects.try_recv() {
        assert_ne!(effect, Effect::PromptUsername);
    }
    assert_eq!(hub.lock().await.health().users_known, 1);

    drop(handle.actions);
    task.await.unwrap().unwrap();
}

async fn next_event(ws: &mut WebSocketStream<TcpStream>) -> Option<ClientEvent> {
    loop {
        match ws.next().await? {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn reply_joined(ws: &mut WebSocketStream<TcpStream>, id: &UserId) {
    let event = ServerEvent::JoinedChatroom {
        id: id.clone(),
        username: "Zoe".into(),
        selected_user: None,
        room_id: RoomId::general(),
        users: Vec::new(),
        recent_messages: Vec::new(),
    };
    let text = serde_json::to_string(&event).unwrap();
    ws.send(Message::Text(text.into())).await.unwrap();
}

#[tokio::test]
async fn reconnect_after_drop_rejoins_once_with_saved_id() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/chat/ws", listener.local_addr().unwrap());
    let minted = UserId::generate();

    // Scripted server: accept a fresh join, hang up, then expect the same
    // user back with its id and nothing more.
    let server = {
        let minted = minted.clone();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            assert_eq!(
                next_event(&mut ws).await,
                Some(ClientEvent::JoinChatroom {
                    user_id: None,
                    username: "Zoe".into()
                })
            );
            reply_joined(&mut ws, &minted).await;
            ws.close(None).await.unwrap();
            drop(ws);

            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            assert_eq!(
                next_event(&mut ws).await,
                Some(ClientEvent::JoinChatroom {
                    user_id: Some(minted.clone()),
                    username: "Zoe".into()
                })
            );
            reply_joined(&mut ws, &minted).await;

            let extra =
                tokio::time::timeout(Duration::from_millis(300), next_event(&mut ws)).await;
            assert!(extra.is_err(), "unexpected frame after join: {extra:?}");
            ws
        })
    };

    let dir = tempfile::tempdir().unwrap();
    let (mut handle, task) = start(&url, dir.path());
    assert_eq!(handle.effects.recv().await, Some(Effect::PromptUsername));
    handle
        .actions
        .send(UserAction::SubmitUsername("Zoe".into()))
        .unwrap();

    let _socket = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("scripted server timed out")
        .unwrap();

    let state = until_joined(&mut handle.view).await;
    assert_eq!(state.identity().map(|i| &i.id), Some(&minted));
    let saved = IdentityStore::in_dir(dir.path()).load().unwrap();
    assert_eq!(saved.map(|i| i.id), Some(minted));

    drop(handle.actions);
    task.await.unwrap().unwrap();
}
