//! Device actions and per-action results.

use std::fmt;

use serde::Serialize;

use crate::error::DeviceError;

/// A single operation delivered to the TV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    LaunchApp { app_id: String },
    PressButton { button: String },
}

impl Action {
    pub fn launch_app(app_id: impl Into<String>) -> Self {
        Action::LaunchApp {
            app_id: app_id.into(),
        }
    }

    pub fn press_button(button: impl Into<String>) -> Self {
        Action::PressButton {
            button: button.into(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::LaunchApp { app_id } => write!(f, "launch app {}", app_id),
            Action::PressButton { button } => write!(f, "press {}", button),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Succeeded,
    Failed,
}

/// Result of running one action through the wake-retry executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub action: Action,
    pub status: ActionStatus,
    pub error: Option<DeviceError>,
    /// A wake signal was sent while handling this action.
    pub woke_device: bool,
}

impl ExecutionOutcome {
    pub fn succeeded(action: Action, woke_device: bool) -> Self {
        Self {
            action,
            status: ActionStatus::Succeeded,
            error: None,
            woke_device,
        }
    }

    pub fn failed(action: Action, error: DeviceError, woke_device: bool) -> Self {
        Self {
            action,
            status: ActionStatus::Failed,
            error: Some(error),
            woke_device,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Succeeded
    }
}
