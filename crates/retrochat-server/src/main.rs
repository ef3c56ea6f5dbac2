use clap::Parser;
use retrochat_server::{Args, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("retrochat_server=info".parse()?))
        .init();

    let args = Args::parse();
    let config = ServerConfig::load(&args)?;
    tracing::info!(
        "Starting chat server on {} (history {}, max message {} chars)",
        config.bind,
        config.history_limit,
        config.max_message_len
    );

    retrochat_server::run(config).await
}
