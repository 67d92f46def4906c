//! Chat-command front-end. Command parsing and authorization live here and
//! are transport-agnostic; [`telegram`] wires them to the Bot API.

mod auth;
pub mod telegram;

use std::sync::Arc;

use tracing::warn;

pub use auth::AuthorizationGate;

use super::{Target, describe_error, execute};
use crate::config::TelegramConfig;
use crate::engine::MacroRunner;

pub const DENIED_REPLY: &str =
    "You are not authorized to use this bot.\nContact the administrator to request access.";

/// What the bot should do with an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotReply {
    /// Not a command; stay silent.
    Ignore,
    Text(String),
    /// Acknowledge with `ack`, run `target`, then replace the acknowledgment
    /// with the result.
    Execute { target: Target, ack: String },
}

pub struct BotFrontend {
    gate: AuthorizationGate,
    runner: Arc<dyn MacroRunner>,
}

impl BotFrontend {
    pub fn new(gate: AuthorizationGate, runner: Arc<dyn MacroRunner>) -> Self {
        Self { gate, runner }
    }

    pub fn from_config(config: &TelegramConfig, runner: Arc<dyn MacroRunner>) -> Self {
        if config.allowed_chat_ids.is_empty() {
            warn!("telegram.allowed_chat_ids is empty; every chat will be refused");
        }
        Self::new(
            AuthorizationGate::new(config.allowed_chat_ids.iter().copied()),
            runner,
        )
    }

    pub fn interpret(&self, chat_id: i64, text: &str) -> BotReply {
        let Some(command) = parse_command(text) else {
            return BotReply::Ignore;
        };
        if let Err(e) = self.gate.authorize(chat_id) {
            return BotReply::Text(describe_error(&e));
        }

        match command.as_str() {
            "start" | "help" => BotReply::Text(self.help_text()),
            name => match Target::resolve(name, &self.runner.macro_names()) {
                Ok(target) => {
                    let ack = match &target {
                        Target::Wake => "Sending Wake-on-LAN to the TV...".to_string(),
                        Target::PowerOff => "Turning off the TV...".to_string(),
                        Target::Macro(m) => format!("Executing '{}'...", m),
                    };
                    BotReply::Execute { target, ack }
                }
                Err(_) => BotReply::Text(format!(
                    "Unknown command /{}. Send /help to see what I can do.",
                    name
                )),
            },
        }
    }

    /// Blocking; run off the async executor.
    pub fn execute(&self, target: &Target) -> String {
        match execute(self.runner.as_ref(), target) {
            Ok(completion) => completion.message(),
            Err(e) => describe_error(&e),
        }
    }

    /// Command name and description pairs for the client-side menu.
    pub fn command_menu(&self) -> Vec<(String, String)> {
        let mut menu = vec![
            ("wake".to_string(), "Turn on the TV".to_string()),
            ("turn_off".to_string(), "Turn off the TV".to_string()),
        ];
        menu.extend(
            self.runner
                .macro_names()
                .into_iter()
                .map(|name| (name.clone(), format!("Run {}", name))),
        );
        menu
    }

    fn help_text(&self) -> String {
        let mut text = String::from("TV Remote\n\nAvailable commands:\n");
        for (name, description) in self.command_menu() {
            text.push_str(&format!("/{} - {}\n", name, description));
        }
        text.push_str("\nTap a command to control the TV.");
        text
    }
}

/// Command word of a `/command` message, lowercased and without a
/// `@botname` suffix or arguments.
fn parse_command(text: &str) -> Option<String> {
    let word = text.trim().strip_prefix('/')?.split_whitespace().next()?;
    let name = word.split('@').next()?;
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase())
}
