//! Server configuration: defaults, overlaid by an optional TOML file,
//! overlaid by command line flags and environment variables.

use clap::Parser;
use retrochat_core::DEFAULT_MAX_MESSAGE_CHARS;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const DEFAULT_BIND: ([u8; 4], u16) = ([127, 0, 0, 1], 8080);
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[derive(Debug, Default, Parser)]
#[command(name = "retrochat-server", version, about = "Realtime chatroom server")]
pub struct Args {
    /// TOML config file
    #[arg(long, env = "RETROCHAT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "RETROCHAT_BIND")]
    pub bind: Option<SocketAddr>,

    /// Messages replayed when a room is opened
    #[arg(long, env = "RETROCHAT_HISTORY_LIMIT")]
    pub history_limit: Option<usize>,

    /// Longest accepted message, in characters
    #[arg(long, env = "RETROCHAT_MAX_MESSAGE_LEN")]
    pub max_message_len: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    bind: Option<SocketAddr>,
    history_limit: Option<usize>,
    max_message_len: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub history_limit: usize,
    pub max_message_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.into(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            max_message_len: DEFAULT_MAX_MESSAGE_CHARS,
        }
    }
}

impl ServerConfig {
    /// Resolve the effective config from parsed arguments.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => read_file(path)?,
            None => FileConfig::default(),
        };

        let defaults = Self::default();
        let config = Self {
            bind: args.bind.or(file.bind).unwrap_or(defaults.bind),
            history_limit: args
                .history_limit
                .or(file.history_limit)
                .unwrap_or(defaults.history_limit),
            max_message_len: args
                .max_message_len
                .or(file.max_message_len)
                .unwrap_or(defaults.max_message_len),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.history_limit == 0 {
            return Err(ConfigError::Zero("history_limit"));
        }
        if self.max_message_len == 0 {
            return Err(ConfigError::Zero("max_message_len"));
        }
        Ok(())
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    parse_file(&text, path)
}

fn parse_file(text: &str, path: &Path) -> Result<FileConfig, ConfigError> {
    toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}
