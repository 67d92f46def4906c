//! Persistence of the TV pairing key.
//!
//! The key is read once at startup and written back into the configuration
//! file the first time the TV issues one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::info;

use crate::error::ConfigError;

/// Read-at-startup / write-on-first-pairing contract for the pairing key.
pub trait CredentialStore: Send + Sync {
    /// The stored key, `None` when the device has never been paired.
    fn client_key(&self) -> Option<String>;

    /// Persist a newly issued key.
    fn store_client_key(&self, key: &str) -> Result<(), ConfigError>;
}

/// Write-through store backed by the TOML configuration file.
pub struct FileCredentialStore {
    target: PathBuf,
    source: PathBuf,
    key: RwLock<Option<String>>,
}

impl FileCredentialStore {
    /// `source` is the file the configuration was read from; `target` is the
    /// file new keys are written to. They differ when the example file was
    /// used as a fallback.
    pub fn new(target: impl Into<PathBuf>, source: impl Into<PathBuf>, initial: &str) -> Self {
        let initial = initial.trim();
        Self {
            target: target.into(),
            source: source.into(),
            key: RwLock::new((!initial.is_empty()).then(|| initial.to_string())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.target
    }

    fn write_key(&self, key: &str) -> Result<(), ConfigError> {
        let base = if self.target.exists() {
            &self.target
        } else {
            &self.source
        };
        let text = fs::read_to_string(base).map_err(|e| ConfigError::io(base, e))?;
        let mut doc: toml::Table = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: base.clone(),
            source,
        })?;

        let device = doc
            .entry("device")
            .or_insert_with(|| toml::Value::Table(toml::Table::new()));
        let Some(device) = device.as_table_mut() else {
            return Err(ConfigError::Invalid("[device] is not a table".to_string()));
        };
        device.insert(
            "client_key".to_string(),
            toml::Value::String(key.to_string()),
        );

        // Comments in the existing file do not survive the rewrite
        let rendered = toml::to_string_pretty(&doc)?;
        let tmp = self.target.with_extension("toml.tmp");
        fs::write(&tmp, rendered).map_err(|e| ConfigError::io(&tmp, e))?;
        fs::rename(&tmp, &self.target).map_err(|e| ConfigError::io(&self.target, e))?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn client_key(&self) -> Option<String> {
        self.key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store_client_key(&self, key: &str) -> Result<(), ConfigError> {
        // Readers block until the file and the cached key agree
        let mut cached = self.key.write().unwrap_or_else(PoisonError::into_inner);
        if cached.as_deref() == Some(key) {
            return Ok(());
        }
        self.write_key(key)?;
        *cached = Some(key.to_string());
        info!("Pairing key saved to {}", self.target.display());
        Ok(())
    }
}
