//! TOML configuration: device address, wake settings, macro catalog source,
//! bot and web front-end settings.

mod store;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pnet::util::MacAddr;
use serde::Deserialize;
use tracing::warn;

use crate::engine::BusyPolicy;
use crate::error::ConfigError;

pub use store::{CredentialStore, FileCredentialStore};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const EXAMPLE_CONFIG_PATH: &str = "config.toml.example";

/// Placeholder token shipped in the example file.
pub const PLACEHOLDER_BOT_TOKEN: &str = "YOUR_BOT_TOKEN_HERE";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub wake: WakeConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub macros: BTreeMap<String, Vec<StepConfig>>,
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub ip: String,
    pub mac: String,
    /// Pairing key issued by the TV; empty until the first accepted prompt.
    #[serde(default)]
    pub client_key: String,
    /// Use `wss://` on port 3001 (required by newer webOS firmware).
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_pairing_timeout")]
    pub pairing_timeout_secs: u64,
    /// How long to wait after a wake signal before reconnecting.
    #[serde(default = "default_wake_grace")]
    pub wake_grace_secs: f64,
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_request_timeout() -> u64 {
    5
}

fn default_pairing_timeout() -> u64 {
    60
}

fn default_wake_grace() -> f64 {
    14.0
}

impl DeviceConfig {
    pub fn mac_address(&self) -> Result<MacAddr, ConfigError> {
        self.mac
            .trim()
            .replace('-', ":")
            .parse::<MacAddr>()
            .map_err(|e| ConfigError::Invalid(format!("device.mac '{}': {}", self.mac, e)))
    }

    pub fn wake_grace(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.wake_grace_secs).map_err(|e| {
            ConfigError::Invalid(format!(
                "device.wake_grace_secs {}: {}",
                self.wake_grace_secs, e
            ))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WakeConfig {
    pub repeat: u32,
    pub interval_ms: u64,
    pub broadcast: String,
    pub port: u16,
    /// Also send to each local interface's directed broadcast address.
    pub interface_broadcast: bool,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            repeat: 3,
            interval_ms: 500,
            broadcast: "255.255.255.255".to_string(),
            port: 9,
            interface_broadcast: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub when_busy: BusyPolicy,
}

/// One macro step as written in the file: exactly one of `app`/`button`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepConfig {
    pub app: Option<String>,
    pub button: Option<String>,
    #[serde(default)]
    pub wait_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,
}

impl TelegramConfig {
    pub fn token(&self) -> Result<&str, ConfigError> {
        let token = self.bot_token.trim();
        if token.is_empty() || token == PLACEHOLDER_BOT_TOKEN {
            return Err(ConfigError::Invalid(
                "telegram.bot_token is not configured".to_string(),
            ));
        }
        Ok(token)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    pub buttons: Vec<WebButtonConfig>,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            buttons: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebButtonConfig {
    pub label: String,
    /// Macro name, `wake`/`turn_on` or `turn_off`.
    pub action: String,
    #[serde(default = "default_button_color")]
    pub color: String,
}

fn default_button_color() -> String {
    "#2e7d32".to_string()
}

impl AppConfig {
    /// Pick the file to read. The default path falls back to the example
    /// file so a fresh checkout still starts.
    pub fn resolve_path(requested: &Path) -> PathBuf {
        let example = Path::new(EXAMPLE_CONFIG_PATH);
        if requested == Path::new(DEFAULT_CONFIG_PATH) && !requested.exists() && example.exists()
        {
            warn!(
                "{} not found; using {}",
                requested.display(),
                example.display()
            );
            return example.to_path_buf();
        }
        requested.to_path_buf()
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        Self::parse(&text, path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.device.ip.trim().is_empty() {
            return Err(ConfigError::Invalid("device.ip is empty".to_string()));
        }
        self.device.mac_address()?;
        self.device.wake_grace()?;
        if self.wake.repeat == 0 {
            return Err(ConfigError::Invalid("wake.repeat must be at least 1".to_string()));
        }
        Ok(())
    }
}
