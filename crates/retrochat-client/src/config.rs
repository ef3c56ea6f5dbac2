use clap::Parser;
use retrochat_core::DEFAULT_MAX_MESSAGE_CHARS;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:8080/chat/ws";

#[derive(Debug, Parser)]
#[command(name = "retrochat", version, about = "Terminal client for the retrochat chatroom")]
pub struct ClientArgs {
    /// Chat websocket endpoint
    #[arg(long, env = "RETROCHAT_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// Directory holding the saved identity
    #[arg(long, env = "RETROCHAT_DATA_DIR", default_value = ".")]
    pub data_dir: PathBuf,

    /// Give up on a connection attempt after this many seconds
    #[arg(long, default_value_t = 15)]
    pub connect_timeout_secs: u64,

    /// Longest message accepted before sending; match the server's setting
    #[arg(long, env = "RETROCHAT_MAX_MESSAGE_LEN", default_value_t = DEFAULT_MAX_MESSAGE_CHARS)]
    pub max_message_len: usize,

    /// Answer the username prompt with this name
    #[arg(long, env = "RETROCHAT_USERNAME")]
    pub username: Option<String>,
}

impl ClientArgs {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            url: self.url.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            max_message_chars: self.max_message_len,
            ..ClientConfig::default()
        }
    }
}

/// Transport settings for [`ChatClient`](crate::ChatClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub url: String,
    pub connect_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// Messages longer than this are refused locally.
    pub max_message_chars: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            connect_timeout: Duration::from_secs(15),
            backoff_initial: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }
}

impl ClientConfig {
    /// Delay before reconnect attempt number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_initial
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.backoff_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_then_caps() {
        let config = ClientConfig::default();
        assert_eq!(config.backoff(0), Duration::from_millis(500));
        assert_eq!(config.backoff(1), Duration::from_secs(1));
        assert_eq!(config.backoff(3), Duration::from_secs(4));
        assert_eq!(config.backoff(10), Duration::from_secs(30));
        assert_eq!(config.backoff(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn args_defaults() {
        let args = ClientArgs::try_parse_from(["retrochat"]).unwrap();
        let config = args.client_config();
        assert_eq!(config.connect_timeout, Duration::from_secs(15));
        assert_eq!(config.backoff_max, Duration::from_secs(30));
    }

    #[test]
    fn message_limit_flag() {
        let args =
            ClientArgs::try_parse_from(["retrochat", "--max-message-len", "140"]).unwrap();
        assert_eq!(args.client_config().max_message_chars, 140);
    }
}
