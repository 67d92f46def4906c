//! Front-ends: one-shot CLI, Telegram bot and web button panel. All of them
//! resolve a requested name to a [`Target`] and hand it to a shared
//! [`MacroRunner`].

pub mod bot;
pub mod cli;
pub mod web;

use std::fmt;

use crate::engine::{MacroResult, MacroRunner, PowerState};
use crate::error::EngineError;

/// What a front-end request asks the engine to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Wake,
    PowerOff,
    Macro(String),
}

impl Target {
    /// Built-in names win over macros; anything else is taken as a macro
    /// name and checked by the engine.
    pub fn parse(name: &str) -> Self {
        match name {
            "wake" | "turn_on" => Target::Wake,
            "turn_off" => Target::PowerOff,
            other => Target::Macro(other.to_string()),
        }
    }

    /// Like [`Target::parse`], but rejects macro names that are not in
    /// `known`.
    pub fn resolve(name: &str, known: &[String]) -> Result<Self, EngineError> {
        match Self::parse(name) {
            Target::Macro(m) if !known.contains(&m) => Err(EngineError::UnknownMacro(m)),
            target => Ok(target),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Wake => write!(f, "wake"),
            Target::PowerOff => write!(f, "turn_off"),
            Target::Macro(name) => write!(f, "{}", name),
        }
    }
}

/// A request that reached the engine and produced an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Woke,
    PowerOff(PowerState),
    Macro(MacroResult),
}

impl Completion {
    pub fn is_success(&self) -> bool {
        match self {
            Completion::Macro(result) => result.is_success(),
            Completion::Woke | Completion::PowerOff(_) => true,
        }
    }

    /// User-facing summary; a failed macro names the failing step.
    pub fn message(&self) -> String {
        match self {
            Completion::Woke => "Wake-on-LAN sent! The TV should be waking up.".to_string(),
            Completion::PowerOff(PowerState::TurnedOff) => "TV turned off.".to_string(),
            Completion::PowerOff(PowerState::AlreadyOff) => {
                "TV is already off or unreachable.".to_string()
            }
            Completion::Macro(result) => match result.failure() {
                None if result.woke_device() => format!(
                    "TV was woken up. Action '{}' completed successfully!",
                    result.name
                ),
                None => format!("Action '{}' completed successfully!", result.name),
                Some((step, outcome)) => {
                    let reason = outcome
                        .error
                        .as_ref()
                        .map_or_else(|| "unknown error".to_string(), |e| e.to_string());
                    format!(
                        "Action '{}' failed at step {} ({}): {}",
                        result.name, step, outcome.action, reason
                    )
                }
            },
        }
    }
}

pub fn execute(runner: &dyn MacroRunner, target: &Target) -> Result<Completion, EngineError> {
    match target {
        Target::Wake => runner.wake_only().map(|_| Completion::Woke),
        Target::PowerOff => runner.power_off().map(Completion::PowerOff),
        Target::Macro(name) => runner.run(name).map(Completion::Macro),
    }
}

/// User-facing text for a request that never produced a result.
pub fn describe_error(err: &EngineError) -> String {
    match err {
        EngineError::UnknownMacro(name) => format!("Unknown action: {}", name),
        EngineError::Busy => "Another command is already running, please wait.".to_string(),
        EngineError::Unauthorized(_) => bot::DENIED_REPLY.to_string(),
        EngineError::Device(e) => format!("Error: {}", e),
    }
}
