//! Error taxonomy shared by the device layer, the macro engine and the
//! configuration loader.

use std::path::PathBuf;

use thiserror::Error;

/// Failures talking to the TV or emitting a wake packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Device unreachable, socket refused or handshake timed out.
    #[error("device unreachable: {0}")]
    Connection(String),

    /// Transport failed while delivering a request on a session believed live.
    #[error("transport failure: {0}")]
    Action(String),

    /// Device answered but refused the request (pairing denied, unknown app).
    #[error("device rejected request: {0}")]
    Rejected(String),

    /// The wake broadcast itself could not be sent.
    #[error("wake signal failed: {0}")]
    Wake(String),
}

impl DeviceError {
    /// Whether a wake-and-retry cycle can plausibly fix this failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DeviceError::Connection(_) | DeviceError::Action(_))
    }
}

/// Errors surfaced by the engine to front-ends before or instead of a
/// per-action result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("unknown macro: {0}")]
    UnknownMacro(String),

    #[error("another command is already running, please wait")]
    Busy,

    #[error("chat {0} is not authorized")]
    Unauthorized(i64),

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Errors loading, validating or writing back the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.into(),
            source,
        }
    }
}
