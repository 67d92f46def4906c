//! Wake-on-LAN. Broadcasts magic packets to the TV's MAC address; there is
//! no acknowledgment, so success only means the packets left this host.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use ipnetwork::Ipv4Network;
use pnet::datalink;
use pnet::util::MacAddr;
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::config::WakeConfig;
use crate::error::{ConfigError, DeviceError};

const MAGIC_PACKET_LEN: usize = 102;

pub trait WakeSignal: Send + Sync {
    fn wake(&self) -> Result<(), DeviceError>;
}

/// Six `0xFF` bytes followed by sixteen copies of the MAC address.
pub fn magic_packet(mac: MacAddr) -> [u8; MAGIC_PACKET_LEN] {
    let MacAddr(a, b, c, d, e, f) = mac;
    let octets = [a, b, c, d, e, f];

    let mut packet = [0xffu8; MAGIC_PACKET_LEN];
    for chunk in packet[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&octets);
    }
    packet
}

pub struct MagicPacketWaker {
    mac: MacAddr,
    broadcast: Ipv4Addr,
    port: u16,
    repeat: u32,
    interval: Duration,
    interface_broadcast: bool,
}

impl MagicPacketWaker {
    pub fn new(mac: MacAddr, config: &WakeConfig) -> Result<Self, ConfigError> {
        let broadcast = config.broadcast.parse::<Ipv4Addr>().map_err(|e| {
            ConfigError::Invalid(format!("wake.broadcast '{}': {}", config.broadcast, e))
        })?;

        Ok(Self {
            mac,
            broadcast,
            port: config.port,
            repeat: config.repeat.max(1),
            interval: Duration::from_millis(config.interval_ms),
            interface_broadcast: config.interface_broadcast,
        })
    }

    fn targets(&self) -> Vec<SocketAddrV4> {
        let mut targets = vec![SocketAddrV4::new(self.broadcast, self.port)];
        if self.interface_broadcast {
            for addr in Self::interface_broadcasts() {
                let target = SocketAddrV4::new(addr, self.port);
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        targets
    }

    /// Directed broadcast address of every up, non-loopback IPv4 interface
    fn interface_broadcasts() -> Vec<Ipv4Addr> {
        datalink::interfaces()
            .into_iter()
            .filter(|iface| iface.is_up() && !iface.is_loopback())
            .flat_map(|iface| {
                iface.ips.into_iter().filter_map(|ip| {
                    if let IpAddr::V4(ipv4) = ip.ip() {
                        Ipv4Network::new(ipv4, ip.prefix())
                            .ok()
                            .map(|net| net.broadcast())
                    } else {
                        None
                    }
                })
            })
            .collect()
    }

    fn broadcast_socket() -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_broadcast(true)?;
        socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())?;
        Ok(socket.into())
    }
}

impl WakeSignal for MagicPacketWaker {
    fn wake(&self) -> Result<(), DeviceError> {
        let socket = Self::broadcast_socket().map_err(|e| DeviceError::Wake(e.to_string()))?;
        let packet = magic_packet(self.mac);
        let targets = self.targets();

        info!("Sending Wake-on-LAN to {}...", self.mac);
        let mut delivered = 0usize;
        let mut last_error = None;
        for round in 0..self.repeat {
            if round > 0 {
                std::thread::sleep(self.interval);
            }
            for target in &targets {
                match socket.send_to(&packet, target) {
                    Ok(_) => delivered += 1,
                    Err(e) => {
                        debug!("Magic packet to {} failed: {}", target, e);
                        last_error = Some(e);
                    }
                }
            }
        }

        if delivered == 0 {
            let reason = last_error.map_or_else(|| "no targets".to_string(), |e| e.to_string());
            warn!("Wake-on-LAN could not be sent: {}", reason);
            return Err(DeviceError::Wake(reason));
        }
        Ok(())
    }
}
