//! Realtime chatroom server.
//!
//! A single [`ChatHub`](hub::ChatHub) owns the presence registry and the
//! message log; websocket connections under `/chat/ws` feed it events.

pub mod config;
pub mod error;
pub mod hub;
pub mod presence;
pub mod store;
pub mod ws;

use std::future::Future;
use tokio::net::TcpListener;

pub use config::{Args, ServerConfig};
pub use hub::{ChatHub, SharedHub};

/// Serve the chat routes on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, hub: SharedHub, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = ws::router(hub);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let hub = ChatHub::shared(&config);
    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!("Listening on ws://{}/chat/ws", listener.local_addr()?);

    serve(listener, hub, shutdown_signal()).await?;
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Could not listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
