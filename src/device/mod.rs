mod lg;
mod session;
mod transport;
mod types;
mod wake;

pub use lg::{LgClientConfig, LgWebOsClient};
pub use session::DeviceSession;
#[cfg(test)]
pub use transport::TvTransport;
pub use types::{Action, ActionStatus, ExecutionOutcome};
pub use wake::{MagicPacketWaker, WakeSignal};
