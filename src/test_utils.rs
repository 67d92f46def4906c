use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::CredentialStore;
use crate::device::{Action, ExecutionOutcome, TvTransport, WakeSignal};
use crate::engine::{MacroResult, MacroRunner, PowerState};
use crate::error::{ConfigError, DeviceError, EngineError};

/// Something observable that happened to the fake TV
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect(Option<String>),
    Send(Action),
    PowerOff,
    Disconnect,
    Wake,
}

/// Ordered event log shared between a fake TV and its waker
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Debug, Default)]
struct FakeTvState {
    connected: bool,
    asleep: bool,
    unreachable: bool,
    connect_failures: usize,
    send_failures: usize,
    reject_sends: bool,
    refuse_pairing: bool,
    issued_key: Option<String>,
    connects: usize,
}

/// Scriptable in-memory TV. Clones share state, so a test keeps one handle
/// while the session owns another.
#[derive(Debug, Clone, Default)]
pub struct FakeTv {
    log: EventLog,
    state: Arc<Mutex<FakeTvState>>,
}

impl FakeTv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses connections until a waker built with [`FakeWaker::waking`] fires
    pub fn asleep() -> Self {
        let tv = Self::new();
        tv.state.lock().unwrap().asleep = true;
        tv
    }

    /// Refuses every connection, wake or not
    pub fn unreachable() -> Self {
        let tv = Self::new();
        tv.state.lock().unwrap().unreachable = true;
        tv
    }

    pub fn issuing_key(self, key: &str) -> Self {
        self.state.lock().unwrap().issued_key = Some(key.to_string());
        self
    }

    pub fn failing_connects(self, n: usize) -> Self {
        self.state.lock().unwrap().connect_failures = n;
        self
    }

    /// The next `n` sends drop the connection mid-request
    pub fn failing_sends(self, n: usize) -> Self {
        self.state.lock().unwrap().send_failures = n;
        self
    }

    pub fn rejecting_sends(self) -> Self {
        self.state.lock().unwrap().reject_sends = true;
        self
    }

    /// Answers every registration with a refusal
    pub fn refusing_pairing(self) -> Self {
        self.state.lock().unwrap().refuse_pairing = true;
        self
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.snapshot()
    }

    /// Connection attempts, successful or not
    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    fn wake(&self) {
        self.state.lock().unwrap().asleep = false;
    }

    fn deliver(&mut self, action: Action) -> Result<(), DeviceError> {
        self.log.push(Event::Send(action));
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(DeviceError::Action("not connected".to_string()));
        }
        if state.reject_sends {
            return Err(DeviceError::Rejected("request refused".to_string()));
        }
        if state.send_failures > 0 {
            state.send_failures -= 1;
            state.connected = false;
            return Err(DeviceError::Action("connection reset".to_string()));
        }
        Ok(())
    }
}

impl TvTransport for FakeTv {
    fn connect(&mut self, client_key: Option<&str>) -> Result<Option<String>, DeviceError> {
        self.log.push(Event::Connect(client_key.map(str::to_string)));
        let mut state = self.state.lock().unwrap();
        state.connects += 1;
        if state.unreachable || state.asleep {
            return Err(DeviceError::Connection("connection refused".to_string()));
        }
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(DeviceError::Connection("timed out".to_string()));
        }
        if state.refuse_pairing {
            return Err(DeviceError::Rejected("pairing refused".to_string()));
        }
        state.connected = true;
        Ok(state.issued_key.clone())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn launch_app(&mut self, app_id: &str) -> Result<(), DeviceError> {
        self.deliver(Action::launch_app(app_id))
    }

    fn press_button(&mut self, button: &str) -> Result<(), DeviceError> {
        self.deliver(Action::press_button(button))
    }

    fn power_off(&mut self) -> Result<(), DeviceError> {
        self.log.push(Event::PowerOff);
        if self.state.lock().unwrap().connected {
            Ok(())
        } else {
            Err(DeviceError::Action("not connected".to_string()))
        }
    }

    fn disconnect(&mut self) {
        let mut state = self.state.lock().unwrap();
        if state.connected {
            state.connected = false;
            self.log.push(Event::Disconnect);
        }
    }
}

/// Wake signal that records into an [`EventLog`]
pub struct FakeWaker {
    log: EventLog,
    target: Option<FakeTv>,
    fail: bool,
    count: AtomicUsize,
}

impl FakeWaker {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            target: None,
            fail: false,
            count: AtomicUsize::new(0),
        }
    }

    pub fn failing(log: EventLog) -> Self {
        Self {
            fail: true,
            ..Self::new(log)
        }
    }

    /// Wake `tv` whenever this signal fires
    pub fn waking(mut self, tv: &FakeTv) -> Self {
        self.target = Some(tv.clone());
        self
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl WakeSignal for FakeWaker {
    fn wake(&self) -> Result<(), DeviceError> {
        if self.fail {
            return Err(DeviceError::Wake("network unreachable".to_string()));
        }
        self.count.fetch_add(1, Ordering::SeqCst);
        self.log.push(Event::Wake);
        if let Some(tv) = &self.target {
            tv.wake();
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    key: Mutex<Option<String>>,
    writes: AtomicUsize,
}

impl MemoryCredentialStore {
    pub fn with_key(key: &str) -> Self {
        Self {
            key: Mutex::new(Some(key.to_string())),
            ..Self::default()
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn client_key(&self) -> Option<String> {
        self.key.lock().unwrap().clone()
    }

    fn store_client_key(&self, key: &str) -> Result<(), ConfigError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.key.lock().unwrap() = Some(key.to_string());
        Ok(())
    }
}

/// Front-end double for [`MacroRunner`]: records each call and answers from
/// a fixed script.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    names: Vec<String>,
    busy: bool,
    failure: Option<DeviceError>,
    calls: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn busy(mut self) -> Self {
        self.busy = true;
        self
    }

    /// Every macro fails on its first step with `error`
    pub fn failing_with(mut self, error: DeviceError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl MacroRunner for RecordingRunner {
    fn run(&self, name: &str) -> Result<MacroResult, EngineError> {
        self.record(format!("run:{}", name));
        if !self.names.iter().any(|n| n == name) {
            return Err(EngineError::UnknownMacro(name.to_string()));
        }
        if self.busy {
            return Err(EngineError::Busy);
        }
        let action = Action::press_button("HOME");
        let outcome = match &self.failure {
            Some(error) => ExecutionOutcome::failed(action, error.clone(), false),
            None => ExecutionOutcome::succeeded(action, false),
        };
        Ok(MacroResult::new(name, vec![outcome]))
    }

    fn wake_only(&self) -> Result<(), EngineError> {
        self.record("wake".to_string());
        Ok(())
    }

    fn power_off(&self) -> Result<PowerState, EngineError> {
        self.record("power_off".to_string());
        if self.busy {
            return Err(EngineError::Busy);
        }
        Ok(PowerState::TurnedOff)
    }

    fn macro_names(&self) -> Vec<String> {
        self.names.clone()
    }
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a subscriber that captures formatted log lines
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();

    let out = tracing::subscriber::with_default(subscriber, f);
    let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).into_owned();
    (out, logs)
}
