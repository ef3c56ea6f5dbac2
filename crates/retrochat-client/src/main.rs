//! Terminal front-end.
//!
//! Plain lines are chat messages. Commands:
//!   /dm <name or id prefix>   open a direct conversation
//!   /general                  back to the public room
//!   /users                    who is around, with unread counts
//!   /forget                   drop the saved identity
//!   /quit

use clap::Parser;
use retrochat_client::{
    ChatClient, ChatState, ClientArgs, ClientHandle, Effect, IdentityStore, UserAction, Viewing,
};
use retrochat_core::{ConnectionState, RoomId};
use std::collections::HashSet;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("retrochat_client=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = ClientArgs::parse();
    let store = IdentityStore::in_dir(&args.data_dir);
    let (client, handle) = ChatClient::new(args.client_config(), store.clone());
    let ClientHandle {
        actions,
        mut view,
        mut effects,
    } = handle;
    let client_task = tokio::spawn(client.run());

    let mut screen = Screen::new(args.username.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !screen.on_line(line.trim(), &view.borrow(), &actions, &store) {
                    break;
                }
            }
            effect = effects.recv() => {
                let Some(effect) = effect else { break };
                screen.on_effect(effect, &view.borrow(), &actions);
            }
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
                screen.on_state(&view.borrow_and_update());
            }
        }
    }

    drop(actions);
    client_task.await??;
    Ok(())
}

struct Screen {
    /// Name to answer the first prompt with.
    preset_username: Option<String>,
    prompting: bool,
    connection: ConnectionState,
    shown_room: Option<RoomId>,
    printed: HashSet<String>,
}

impl Screen {
    fn new(preset_username: Option<String>) -> Self {
        Self {
            preset_username,
            prompting: false,
            connection: ConnectionState::Disconnected,
            shown_room: None,
            printed: HashSet::new(),
        }
    }

    /// Returns `false` when the user asked to quit.
    fn on_line(
        &mut self,
        line: &str,
        state: &ChatState,
        actions: &mpsc::UnboundedSender<UserAction>,
        store: &IdentityStore,
    ) -> bool {
        if line == "/quit" {
            return false;
        }
        if self.prompting {
            self.prompting = false;
            let _ = actions.send(UserAction::SubmitUsername(line.to_string()));
            return true;
        }

        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        match command {
            "/general" => {
                let _ = actions.send(UserAction::SelectPeer(None));
            }
            "/dm" => match find_user(state, rest.trim()) {
                Some(id) => {
                    let _ = actions.send(UserAction::SelectPeer(Some(id)));
                }
                None => println!("! no user matching '{}'", rest.trim()),
            },
            "/users" => print_users(state),
            "/forget" => match store.clear() {
                Ok(()) => println!("* identity forgotten; restart to pick a new name"),
                Err(e) => println!("! {e}"),
            },
            _ if command.starts_with('/') => println!("! unknown command {command}"),
            _ => {
                let _ = actions.send(UserAction::EditInput(line.to_string()));
                let _ = actions.send(UserAction::Send);
            }
        }
        true
    }

    fn on_effect(
        &mut self,
        effect: Effect,
        state: &ChatState,
        actions: &mpsc::UnboundedSender<UserAction>,
    ) {
        match effect {
            Effect::PromptUsername => match self.preset_username.take() {
                Some(name) => {
                    let _ = actions.send(UserAction::SubmitUsername(name));
                }
                None => {
                    self.prompting = true;
                    println!("Pick a username (2-20 characters):");
                }
            },
            Effect::FocusInput => {
                if let Some(identity) = state.identity() {
                    println!(
                        "* you are {} - type to chat, /users to look around",
                        identity.username
                    );
                }
            }
            Effect::ScrollToBottom => self.print_new_messages(state),
            Effect::Rejected(reason) => println!("! {reason}"),
            Effect::Emit(_) | Effect::PersistIdentity(_) => {}
        }
    }

    fn on_state(&mut self, state: &ChatState) {
        let connection = state.connection();
        if connection == self.connection {
            return;
        }
        match connection {
            ConnectionState::Disconnected if self.connection == ConnectionState::Joined => {
                println!("* offline, sending disabled until we reconnect")
            }
            ConnectionState::Joined => println!("* online"),
            _ => {}
        }
        self.connection = connection;
    }

    fn print_new_messages(&mut self, state: &ChatState) {
        if self.shown_room.as_ref() != Some(state.room_id()) {
            self.shown_room = Some(state.room_id().clone());
            self.printed.clear();
            let title = match state.viewing() {
                Viewing::General => "general".to_string(),
                Viewing::Peer(id) => state
                    .user(id)
                    .map_or_else(|| id.to_string(), |u| format!("@{}", u.username)),
            };
            println!("--- {title} ---");
        }

        for message in state.messages() {
            if !self.printed.insert(message.id.clone()) {
                continue;
            }
            println!(
                "[{}] {}: {}",
                message.timestamp.format("%H:%M"),
                message.sender_name,
                message.text
            );
        }
    }
}

fn find_user(state: &ChatState, query: &str) -> Option<retrochat_core::UserId> {
    if query.is_empty() {
        return None;
    }
    state
        .users()
        .iter()
        .find(|u| u.username.eq_ignore_ascii_case(query))
        .or_else(|| state.users().iter().find(|u| u.id.as_str().starts_with(query)))
        .map(|u| u.id.clone())
}

fn print_users(state: &ChatState) {
    if state.users().is_empty() {
        println!("* nobody else here yet");
        return;
    }
    for user in state.users() {
        let dot = if user.is_online { "●" } else { "○" };
        let badge = match user.unread_count {
            0 => String::new(),
            n => format!(" ({n} unread)"),
        };
        println!("{dot} {} [{}]{badge}", user.username, user.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_works_at_the_username_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::in_dir(dir.path());
        let (actions, mut rx) = mpsc::unbounded_channel();
        let mut screen = Screen::new(None);
        screen.on_effect(Effect::PromptUsername, &ChatState::new(), &actions);

        assert!(!screen.on_line("/quit", &ChatState::new(), &actions, &store));
        assert!(rx.try_recv().is_err());

        assert!(screen.on_line("Zoe", &ChatState::new(), &actions, &store));
        assert_eq!(
            rx.try_recv().unwrap(),
            UserAction::SubmitUsername("Zoe".into())
        );
    }
}
