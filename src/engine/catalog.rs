//! Named macros loaded from configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::StepConfig;
use crate::device::Action;
use crate::error::ConfigError;

/// Names that front-ends claim for built-in commands.
pub const RESERVED_NAMES: &[&str] = &["wake", "turn_on", "turn_off", "start", "help"];

const MAX_NAME_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub struct MacroStep {
    pub action: Action,
    /// Pause after the action succeeds, before the next one.
    pub settle: Duration,
}

impl MacroStep {
    #[cfg(test)]
    pub fn new(action: Action) -> Self {
        Self {
            action,
            settle: Duration::ZERO,
        }
    }
}

impl TryFrom<&StepConfig> for MacroStep {
    type Error = String;

    fn try_from(step: &StepConfig) -> Result<Self, Self::Error> {
        let action = match (&step.app, &step.button) {
            (Some(app), None) if !app.trim().is_empty() => Action::launch_app(app.trim()),
            (None, Some(button)) if !button.trim().is_empty() => {
                Action::press_button(button.trim())
            }
            _ => return Err("each step needs exactly one of `app` or `button`".to_string()),
        };

        let settle = Duration::try_from_secs_f64(step.wait_secs)
            .map_err(|e| format!("invalid wait_secs {}: {}", step.wait_secs, e))?;

        Ok(Self { action, settle })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Macro {
    pub name: String,
    pub steps: Vec<MacroStep>,
}

#[derive(Debug, Clone, Default)]
pub struct MacroCatalog {
    macros: BTreeMap<String, Macro>,
}

impl MacroCatalog {
    pub fn new(macros: impl IntoIterator<Item = Macro>) -> Self {
        Self {
            macros: macros.into_iter().map(|m| (m.name.clone(), m)).collect(),
        }
    }

    pub fn from_config(config: &BTreeMap<String, Vec<StepConfig>>) -> Result<Self, ConfigError> {
        let mut macros = Vec::with_capacity(config.len());
        for (name, steps) in config {
            validate_name(name)?;
            if steps.is_empty() {
                return Err(ConfigError::Invalid(format!("macro '{}' has no steps", name)));
            }

            let steps = steps
                .iter()
                .enumerate()
                .map(|(i, step)| {
                    MacroStep::try_from(step).map_err(|e| {
                        ConfigError::Invalid(format!("macro '{}' step {}: {}", name, i + 1, e))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            macros.push(Macro {
                name: name.clone(),
                steps,
            });
        }
        Ok(Self::new(macros))
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.macros.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

/// Macro names double as URL path segments and bot commands.
fn validate_name(name: &str) -> Result<(), ConfigError> {
    let well_formed = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !well_formed {
        return Err(ConfigError::Invalid(format!(
            "macro name '{}' must be 1-{} characters of a-z, 0-9 or _",
            name, MAX_NAME_LEN
        )));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(ConfigError::Invalid(format!(
            "macro name '{}' is reserved",
            name
        )));
    }
    Ok(())
}
