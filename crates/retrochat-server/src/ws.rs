//! Websocket transport: one task pair per socket, feeding the hub.

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use retrochat_core::{CHAT_NAMESPACE, ClientEvent, ServerEvent};
use tokio::sync::mpsc;

use crate::hub::{ConnectionId, Health, SharedHub};

/// Routes for the chat namespace: `/chat/ws` and `/chat/health`.
pub fn router(hub: SharedHub) -> Router {
    let chat = Router::new()
        .route("/ws", get(chat_ws))
        .route("/health", get(health));

    Router::new().nest(CHAT_NAMESPACE, chat).with_state(hub)
}

async fn health(State(hub): State<SharedHub>) -> Json<Health> {
    Json(hub.lock().await.health())
}

async fn chat_ws(ws: WebSocketUpgrade, State(hub): State<SharedHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: SharedHub) {
    let (mut sink, mut stream) = socket.split();
    let (outbox, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let conn = hub.lock().await.connect(outbox);

    tracing::debug!("Connection {} opened", conn);

    let mut writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Could not encode {}: {}", event.name(), e);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => on_text(&hub, conn, text.as_str()).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!("Connection {} error: {}", conn, e);
                        break;
                    }
                }
            }
            _ = &mut writer => break,
        }
    }

    hub.lock().await.disconnect(conn);
    writer.abort();
    tracing::debug!("Connection {} closed", conn);
}

/// Malformed frames are logged and skipped; the socket stays open.
async fn on_text(hub: &SharedHub, conn: ConnectionId, text: &str) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => hub.lock().await.handle(conn, event),
        Err(e) => tracing::warn!("Invalid frame on connection {}: {}", conn, e),
    }
}
