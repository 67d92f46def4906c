use crate::error::DeviceError;

/// Low-level client for one TV. Calls block until the device answers or the
/// transport's own timeout fires.
pub trait TvTransport: Send {
    /// Open a session. Without a key the TV shows a pairing prompt. Returns
    /// the key the TV reported during registration, if any.
    fn connect(&mut self, client_key: Option<&str>) -> Result<Option<String>, DeviceError>;

    fn is_connected(&self) -> bool;

    fn launch_app(&mut self, app_id: &str) -> Result<(), DeviceError>;

    fn press_button(&mut self, button: &str) -> Result<(), DeviceError>;

    fn power_off(&mut self) -> Result<(), DeviceError>;

    /// Close the session; never fails.
    fn disconnect(&mut self);
}
