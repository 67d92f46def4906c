//! Single wake-and-retry recovery around device calls.
//!
//! One action gets at most two attempts. If the first cannot connect, or
//! the send fails with a recoverable error, the TV is woken, the grace
//! period elapses, and the action is tried exactly once more. A request the
//! TV refuses on an open session is final.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::PowerState;
use crate::device::{Action, DeviceSession, ExecutionOutcome, WakeSignal};
use crate::error::DeviceError;

pub struct RetryingExecutor {
    session: DeviceSession,
    wake: Arc<dyn WakeSignal>,
    grace: Duration,
}

impl RetryingExecutor {
    pub fn new(session: DeviceSession, wake: Arc<dyn WakeSignal>, grace: Duration) -> Self {
        Self {
            session,
            wake,
            grace,
        }
    }

    pub fn run_action(&mut self, action: &Action) -> ExecutionOutcome {
        let first = match self.session.ensure_connected() {
            Err(e) => e,
            Ok(()) => match self.session.send_action(action) {
                Ok(()) => return ExecutionOutcome::succeeded(action.clone(), false),
                Err(e) if e.is_recoverable() => e,
                Err(e) => {
                    error!("{} failed: {}", action, e);
                    return ExecutionOutcome::failed(action.clone(), e, false);
                }
            },
        };

        warn!("TV appears to be off ({}), attempting Wake-on-LAN...", first);
        if let Err(e) = self.wake.wake() {
            error!("Wake-on-LAN failed: {}", e);
            return ExecutionOutcome::failed(action.clone(), e, false);
        }
        if !self.grace.is_zero() {
            info!("Waiting {:?} for the TV to start...", self.grace);
            std::thread::sleep(self.grace);
        }

        info!("Retrying {} after wake...", action);
        match self.attempt(action) {
            Ok(()) => ExecutionOutcome::succeeded(action.clone(), true),
            Err(e) => {
                error!("Retry after wake failed: {}", e);
                ExecutionOutcome::failed(action.clone(), e, true)
            }
        }
    }

    fn attempt(&mut self, action: &Action) -> Result<(), DeviceError> {
        self.session.ensure_connected()?;
        self.session.send_action(action)
    }

    /// Turn the TV off without waking it first; an unreachable TV counts as
    /// already off.
    pub fn power_off(&mut self) -> Result<PowerState, DeviceError> {
        let result = self
            .session
            .ensure_connected()
            .and_then(|_| self.session.power_off());
        self.session.disconnect();

        match result {
            Ok(()) => {
                info!("TV turned off");
                Ok(PowerState::TurnedOff)
            }
            Err(e) if e.is_recoverable() => {
                info!("TV appears to already be off or unreachable: {}", e);
                Ok(PowerState::AlreadyOff)
            }
            Err(e) => Err(e),
        }
    }

    /// Close the session at the end of a macro.
    pub fn finish(&mut self) {
        self.session.disconnect();
    }
}
