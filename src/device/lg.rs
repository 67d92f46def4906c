//! LG webOS TV client. Speaks the SSAP JSON protocol over a WebSocket on
//! port 3000 (`ws`) or 3001 (`wss`), plus the secondary pointer-input socket
//! used for remote button presses.

use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tracing::{debug, info};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Connector, Message, WebSocket};
use url::Url;

use super::transport::TvTransport;
use crate::config::DeviceConfig;
use crate::error::DeviceError;

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct LgClientConfig {
    pub ip: String,
    pub secure: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub pairing_timeout: Duration,
}

impl From<&DeviceConfig> for LgClientConfig {
    fn from(device: &DeviceConfig) -> Self {
        Self {
            ip: device.ip.clone(),
            secure: device.secure,
            connect_timeout: Duration::from_secs(device.connect_timeout_secs),
            request_timeout: Duration::from_secs(device.request_timeout_secs),
            pairing_timeout: Duration::from_secs(device.pairing_timeout_secs),
        }
    }
}

/// LG webOS TV WebSocket API implementation
pub struct LgWebOsClient {
    config: LgClientConfig,
    socket: Option<Socket>,
    pointer: Option<Socket>,
    next_id: u64,
}

impl LgWebOsClient {
    const WS_PORT: u16 = 3000;
    const WSS_PORT: u16 = 3001;
    const POLL_INTERVAL: Duration = Duration::from_millis(100);

    pub fn new(config: LgClientConfig) -> Self {
        Self {
            config,
            socket: None,
            pointer: None,
            next_id: 0,
        }
    }

    fn main_url(&self) -> String {
        if self.config.secure {
            format!("wss://{}:{}", self.config.ip, Self::WSS_PORT)
        } else {
            format!("ws://{}:{}", self.config.ip, Self::WS_PORT)
        }
    }

    /// Open a WebSocket with a bounded TCP connect so a powered-off TV fails
    /// fast instead of waiting for the OS timeout.
    fn open_socket(&self, url: &str) -> Result<Socket, DeviceError> {
        let parsed =
            Url::parse(url).map_err(|e| DeviceError::Connection(format!("{}: {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| DeviceError::Connection(format!("{}: missing host", url)))?;
        let port = parsed.port_or_known_default().unwrap_or(Self::WS_PORT);

        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| DeviceError::Connection(e.to_string()))?
            .next()
            .ok_or_else(|| DeviceError::Connection(format!("{}: no address", host)))?;

        let stream = TcpStream::connect_timeout(&addr, self.config.connect_timeout)
            .map_err(|e| DeviceError::Connection(format!("{}: {}", addr, e)))?;
        stream
            .set_read_timeout(Some(self.config.connect_timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.config.request_timeout)))
            .map_err(|e| DeviceError::Connection(e.to_string()))?;

        let connector = if parsed.scheme() == "wss" {
            // webOS serves a self-signed certificate
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|e| DeviceError::Connection(e.to_string()))?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };

        let (socket, _) = tungstenite::client_tls_with_config(url, stream, None, connector)
            .map_err(|e| DeviceError::Connection(format!("{}: {}", url, e)))?;

        // Reads poll from here on so response waits can honour their deadline
        let tcp = match socket.get_ref() {
            MaybeTlsStream::Plain(s) => Some(s),
            MaybeTlsStream::NativeTls(s) => Some(s.get_ref()),
            _ => None,
        };
        if let Some(tcp) = tcp {
            tcp.set_read_timeout(Some(Self::POLL_INTERVAL))
                .map_err(|e| DeviceError::Connection(e.to_string()))?;
        }
        Ok(socket)
    }

    /// Build the registration message for LG TV
    fn build_handshake(client_key: Option<&str>) -> String {
        let permissions = [
            "LAUNCH",
            "LAUNCH_WEBAPP",
            "APP_TO_APP",
            "CONTROL_AUDIO",
            "CONTROL_DISPLAY",
            "CONTROL_INPUT_JOYSTICK",
            "CONTROL_INPUT_MEDIA_PLAYBACK",
            "CONTROL_INPUT_TV",
            "CONTROL_POWER",
            "READ_APP_STATUS",
            "READ_CURRENT_CHANNEL",
            "READ_INPUT_DEVICE_LIST",
            "READ_RUNNING_APPS",
            "READ_TV_CHANNEL_LIST",
            "READ_POWER_STATE",
        ];

        let mut payload = json!({
            "type": "register",
            "id": "register_0",
            "payload": {
                "forcePairing": false,
                "pairingType": "PROMPT",
                "manifest": {
                    "manifestVersion": 1,
                    "appVersion": "1.1",
                    "signed": {
                        "created": "20140509",
                        "appId": "com.lge.test",
                        "vendorId": "com.lge",
                        "localizedAppNames": {
                            "": "TV Macro Remote",
                        },
                        "localizedVendorNames": {
                            "": "LG Electronics"
                        },
                        "permissions": permissions,
                        "serial": "2f930e2d2cfe083771f68e4fe7bb07"
                    },
                    "permissions": permissions,
                    "signatures": [
                        {
                            "signatureVersion": 1,
                            "signature": "eyJhbGdvcml0aG0iOiJSU0EtU0hBMjU2Iiwia2V5SWQiOiJ0ZXN0LXNpZ25pbmctY2VydCIsInNpZ25hdHVyZVZlcnNpb24iOjF9.hrVRgjCwXVvE2OOSpDZ58hR+59aFNwYDyjQgKk3auukd7pcegmE2CzPCa0bJ0ZsRAcKkCTJrWo5iDzNhMBWRyaMOv5zWSrthlf7G128qvIlpMT0YNY+n/FaOHE73uLrS/g7swl3/qH/BGFG2Hu4RlL48eb3lLKqTt2xKHdCs6Cd4RMfJPYnzgvI4BNrFUKsjkcu+WD4OO2A27Pq1n50cMchmcaXadJhGrOqH5YmHdOCj5NSHzJYrsW0HPlpuAx/ECMeIZYDh6RMqaFM2DXzdKX9NmmyqzJ3o/0lkk/N97gfVRLW5hA29yeAwaCViZNCP8iC9aO0q9fQojoa7NQnAtw=="
                        }
                    ]
                }
            }
        });

        if let Some(key) = client_key {
            payload["payload"]["client-key"] = Value::String(key.to_string());
        }

        payload.to_string()
    }

    /// Read the next JSON frame, or `None` if nothing arrived this poll.
    fn read_json(socket: &mut Socket) -> Result<Option<Value>, tungstenite::Error> {
        match socket.read() {
            Ok(Message::Text(text)) => Ok(serde_json::from_str(&text).ok()),
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(ref e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn register(
        &self,
        socket: &mut Socket,
        client_key: Option<&str>,
    ) -> Result<Option<String>, DeviceError> {
        let handshake = Self::build_handshake(client_key);
        socket
            .send(Message::Text(handshake))
            .map_err(|e| DeviceError::Connection(format!("failed to send handshake: {}", e)))?;

        let deadline = Instant::now()
            + if client_key.is_some() {
                self.config.request_timeout
            } else {
                self.config.pairing_timeout
            };

        while Instant::now() < deadline {
            let json = match Self::read_json(socket) {
                Ok(Some(json)) => json,
                Ok(None) => continue,
                Err(e) => return Err(DeviceError::Connection(e.to_string())),
            };

            match json.get("type").and_then(Value::as_str) {
                Some("registered") => {
                    let key = json
                        .get("payload")
                        .and_then(|p| p.get("client-key"))
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    return Ok(key);
                }
                Some("error") => {
                    let reason = json
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("registration refused");
                    return Err(DeviceError::Connection(format!("pairing refused: {}", reason)));
                }
                Some("response") => {
                    if json
                        .get("payload")
                        .and_then(|p| p.get("pairingType"))
                        .and_then(Value::as_str)
                        == Some("PROMPT")
                    {
                        info!("Waiting for the pairing prompt to be accepted on the TV...");
                    }
                }
                _ => {}
            }
        }

        Err(DeviceError::Connection(
            "registration timed out; accept the pairing prompt on the TV".to_string(),
        ))
    }

    /// Send an SSAP request and wait for the matching response payload.
    fn request(&mut self, uri: &str, payload: Option<Value>) -> Result<Value, DeviceError> {
        self.next_id += 1;
        let id = format!("req_{}", self.next_id);
        let timeout = self.config.request_timeout;

        let socket = self
            .socket
            .as_mut()
            .ok_or_else(|| DeviceError::Action("not connected".to_string()))?;

        let mut cmd = json!({
            "type": "request",
            "id": id,
            "uri": uri,
        });
        if let Some(payload) = payload {
            cmd["payload"] = payload;
        }

        let result = Self::exchange(socket, &id, cmd.to_string(), timeout);
        if matches!(result, Err(DeviceError::Action(_))) {
            self.disconnect();
        }
        result
    }

    fn exchange(
        socket: &mut Socket,
        id: &str,
        frame: String,
        timeout: Duration,
    ) -> Result<Value, DeviceError> {
        socket
            .send(Message::Text(frame))
            .map_err(|e| DeviceError::Action(e.to_string()))?;

        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let json = match Self::read_json(socket) {
                Ok(Some(json)) => json,
                Ok(None) => continue,
                Err(e) => return Err(DeviceError::Action(e.to_string())),
            };
            if json.get("id").and_then(Value::as_str) != Some(id) {
                continue;
            }

            if json.get("type").and_then(Value::as_str) == Some("error") {
                let reason = json
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("request failed");
                return Err(DeviceError::Rejected(reason.to_string()));
            }

            let payload = json.get("payload").cloned().unwrap_or(Value::Null);
            if payload.get("returnValue").and_then(Value::as_bool) == Some(false) {
                let reason = payload
                    .get("errorText")
                    .and_then(Value::as_str)
                    .unwrap_or("request returned false");
                return Err(DeviceError::Rejected(reason.to_string()));
            }
            return Ok(payload);
        }

        Err(DeviceError::Action(format!("no response to {} within {:?}", id, timeout)))
    }

    /// Open the pointer-input socket the first time a button is pressed.
    fn pointer_socket(&mut self) -> Result<&mut Socket, DeviceError> {
        if self.pointer.is_none() {
            let payload = self.request(
                "ssap://com.webos.service.networkinput/getPointerInputSocket",
                None,
            )?;
            let path = payload
                .get("socketPath")
                .and_then(Value::as_str)
                .ok_or_else(|| DeviceError::Rejected("no pointer socket offered".to_string()))?
                .to_string();
            debug!("Opening pointer socket {}", path);
            let socket = self
                .open_socket(&path)
                .map_err(|e| DeviceError::Action(e.to_string()))?;
            self.pointer = Some(socket);
        }
        self.pointer
            .as_mut()
            .ok_or_else(|| DeviceError::Action("pointer socket unavailable".to_string()))
    }
}

impl TvTransport for LgWebOsClient {
    fn connect(&mut self, client_key: Option<&str>) -> Result<Option<String>, DeviceError> {
        if self.socket.is_some() {
            self.disconnect();
        }
        let url = self.main_url();
        info!("Connecting to TV at {}...", url);

        let mut socket = self.open_socket(&url)?;
        match self.register(&mut socket, client_key) {
            Ok(key) => {
                self.socket = Some(socket);
                Ok(key)
            }
            Err(e) => {
                let _ = socket.close(None);
                Err(e)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn launch_app(&mut self, app_id: &str) -> Result<(), DeviceError> {
        debug!("Launching app {}", app_id);
        self.request("ssap://system.launcher/launch", Some(json!({ "id": app_id })))
            .map(|_| ())
    }

    fn press_button(&mut self, button: &str) -> Result<(), DeviceError> {
        debug!("Pressing button {}", button);
        let frame = format!("type:button\nname:{}\n\n", button);
        let result = self
            .pointer_socket()?
            .send(Message::Text(frame))
            .map_err(|e| DeviceError::Action(e.to_string()));
        if result.is_err() {
            self.disconnect();
        }
        result
    }

    fn power_off(&mut self) -> Result<(), DeviceError> {
        self.request("ssap://system/turnOff", None).map(|_| ())
    }

    fn disconnect(&mut self) {
        if let Some(mut pointer) = self.pointer.take() {
            let _ = pointer.close(None);
        }
        if let Some(mut socket) = self.socket.take() {
            // The TV may reset the connection instead of completing the close
            let _ = socket.close(None);
        }
    }
}
