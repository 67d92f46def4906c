//! Logical session with the single configured TV.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::transport::TvTransport;
use super::types::Action;
use crate::config::CredentialStore;
use crate::error::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    /// No stored key; the TV is showing (or about to show) a pairing prompt.
    PairingRequired,
    Connected,
}

pub struct DeviceSession {
    transport: Box<dyn TvTransport>,
    credentials: Arc<dyn CredentialStore>,
    state: SessionState,
}

impl DeviceSession {
    pub fn new(transport: Box<dyn TvTransport>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            transport,
            credentials,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Open a session unless one is already live. A key issued during
    /// connection is written through to the credential store.
    pub fn ensure_connected(&mut self) -> Result<(), DeviceError> {
        if self.state == SessionState::Connected && self.transport.is_connected() {
            return Ok(());
        }

        let stored = self.credentials.client_key();
        self.state = if stored.is_some() {
            SessionState::Connecting
        } else {
            info!("No pairing key stored; accept the pairing prompt on the TV");
            SessionState::PairingRequired
        };

        match self.transport.connect(stored.as_deref()) {
            Ok(issued) => {
                if let Some(key) = issued
                    && stored.as_deref() != Some(key.as_str())
                {
                    info!("New pairing key received");
                    // The session is usable even if the key cannot be saved
                    if let Err(e) = self.credentials.store_client_key(&key) {
                        error!("Failed to persist pairing key: {}", e);
                    }
                }
                self.state = SessionState::Connected;
                debug!("Connected and authenticated");
                Ok(())
            }
            Err(e) => {
                self.transport.disconnect();
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Deliver one action on the established session.
    pub fn send_action(&mut self, action: &Action) -> Result<(), DeviceError> {
        if self.state != SessionState::Connected {
            return Err(DeviceError::Action("no established session".to_string()));
        }

        let result = match action {
            Action::LaunchApp { app_id } => self.transport.launch_app(app_id),
            Action::PressButton { button } => self.transport.press_button(button),
        };
        if let Err(e) = &result {
            self.drop_on_failure(e);
        }
        result
    }

    pub fn power_off(&mut self) -> Result<(), DeviceError> {
        if self.state != SessionState::Connected {
            return Err(DeviceError::Action("no established session".to_string()));
        }
        let result = self.transport.power_off();
        if let Err(e) = &result {
            self.drop_on_failure(e);
        }
        result
    }

    pub fn disconnect(&mut self) {
        if self.state != SessionState::Disconnected {
            self.transport.disconnect();
            self.state = SessionState::Disconnected;
            debug!("Disconnected");
        }
    }

    fn drop_on_failure(&mut self, e: &DeviceError) {
        // A rejected request leaves the session intact
        if e.is_recoverable() {
            warn!("Session dropped: {}", e);
            self.transport.disconnect();
            self.state = SessionState::Disconnected;
        }
    }
}
