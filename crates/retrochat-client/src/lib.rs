//! Chatroom client.
//!
//! [`ChatState`] is the UI-facing state machine; [`ChatClient`] wraps it with
//! a websocket, durable identity storage and reconnects.

pub mod config;
pub mod connection;
pub mod error;
pub mod state;
pub mod storage;

pub use config::{ClientArgs, ClientConfig};
pub use connection::{ChatClient, ClientHandle, UserAction};
pub use error::ClientError;
pub use state::{ChatState, Effect, Input, Rejection, Viewing};
pub use storage::IdentityStore;
