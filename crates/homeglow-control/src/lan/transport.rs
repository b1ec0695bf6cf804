//! LAN transport: discovery cache and fire-and-forget UDP control.
//!
//! Control sends open a short-lived socket per datagram and never wait for
//! a reply; the discovery socket lives only for the duration of one scan.
//! The device cache is the single shared structure, guarded by its own
//! mutex, with scans serialized by a separate gate so concurrent cold
//! lookups trigger one scan instead of one per caller.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::error::{ControlError, Result};
use crate::lan::protocol::{self, LampStatus, ScanDevice};
use crate::lan::LampControl;

/// Tunables for the LAN protocol. Defaults match the lamp firmware.
#[derive(Debug, Clone)]
pub struct LanConfig {
    /// Multicast group the discovery request is sent to.
    pub multicast_addr: Ipv4Addr,
    /// Port of the multicast group.
    pub scan_port: u16,
    /// Local port discovery replies arrive on.
    pub listen_port: u16,
    /// Unicast control port on each lamp.
    pub control_port: u16,
    /// How long one scan collects replies.
    pub scan_timeout: Duration,
    /// How long a status query waits for its reply.
    pub status_timeout: Duration,
    /// How long a completed scan stays fresh.
    pub cache_ttl: Duration,
}

impl Default for LanConfig {
    fn default() -> Self {
        Self {
            multicast_addr: Ipv4Addr::new(239, 255, 255, 250),
            scan_port: 4001,
            listen_port: 4002,
            control_port: 4003,
            scan_timeout: Duration::from_secs(3),
            status_timeout: Duration::from_secs(1),
            cache_ttl: Duration::from_secs(300),
        }
    }
}

struct DeviceCache {
    devices: HashMap<String, ScanDevice>,
    last_scan_at: Option<Instant>,
}

impl DeviceCache {
    fn fresh_devices(&self, ttl: Duration) -> Option<Vec<ScanDevice>> {
        let scanned = self.last_scan_at?;
        if scanned.elapsed() < ttl && !self.devices.is_empty() {
            Some(self.devices.values().cloned().collect())
        } else {
            None
        }
    }

    fn fresh_ip(&self, device_id: &str, ttl: Duration) -> Option<Ipv4Addr> {
        let scanned = self.last_scan_at?;
        if scanned.elapsed() < ttl {
            self.devices.get(device_id).map(|d| d.ip)
        } else {
            None
        }
    }
}

/// Controls lamps over the local network via UDP.
///
/// Thread-safe; control methods are fire-and-forget except
/// [`get_status`](Self::get_status).
pub struct LanTransport {
    config: LanConfig,
    cache: Mutex<DeviceCache>,
    scan_gate: Mutex<()>,
}

impl LanTransport {
    /// Create a transport with the given tunables.
    pub fn new(config: LanConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(DeviceCache {
                devices: HashMap::new(),
                last_scan_at: None,
            }),
            scan_gate: Mutex::new(()),
        }
    }

    /// Multicast scan for lamps on the LAN.
    ///
    /// Returns cached results while they are fresh unless `force` is set.
    /// The cache is replaced atomically with the collected set; an empty
    /// reply set is not an error. Fails only when the listen socket cannot
    /// be bound.
    pub fn discover(&self, force: bool) -> Result<Vec<ScanDevice>> {
        if !force {
            if let Some(devices) = self.lock_cache().fresh_devices(self.config.cache_ttl) {
                return Ok(devices);
            }
        }

        // One scan at a time. Whoever waited here gets the winner's results
        // from the cache instead of scanning again.
        let _gate = self
            .scan_gate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !force {
            if let Some(devices) = self.lock_cache().fresh_devices(self.config.cache_ttl) {
                return Ok(devices);
            }
        }

        let devices = self.run_scan()?;

        let mut cache = self.lock_cache();
        cache.devices = devices
            .iter()
            .map(|d| (d.device_id.clone(), d.clone()))
            .collect();
        cache.last_scan_at = Some(Instant::now());
        Ok(devices)
    }

    /// Look up the LAN address for a device.
    ///
    /// Returns the cached address while fresh; otherwise runs one discovery
    /// and retries once. Never blocks longer than the scan deadline.
    pub fn get_ip(&self, device_id: &str) -> Option<Ipv4Addr> {
        if let Some(ip) = self.lock_cache().fresh_ip(device_id, self.config.cache_ttl) {
            return Some(ip);
        }

        if let Err(e) = self.discover(false) {
            warn!("discovery for {device_id} failed: {e}");
        }

        self.lock_cache().fresh_ip(device_id, self.config.cache_ttl)
    }

    /// Turn a lamp on or off.
    pub fn turn(&self, ip: Ipv4Addr, on: bool) -> Result<()> {
        self.send_datagram(ip, &protocol::turn_command(on))
    }

    /// Set lamp brightness, clamped to 1..=100.
    pub fn set_brightness(&self, ip: Ipv4Addr, value: u8) -> Result<()> {
        self.send_datagram(ip, &protocol::brightness_command(value.clamp(1, 100)))
    }

    /// Set lamp color.
    pub fn set_color(&self, ip: Ipv4Addr, r: u8, g: u8, b: u8) -> Result<()> {
        self.send_datagram(ip, &protocol::color_command(r, g, b))
    }

    /// Set lamp color temperature, clamped to 2000..=9000 Kelvin.
    pub fn set_color_temp(&self, ip: Ipv4Addr, kelvin: u16) -> Result<()> {
        self.send_datagram(ip, &protocol::color_temp_command(kelvin.clamp(2000, 9000)))
    }

    /// Query lamp status, waiting up to the status timeout for a reply.
    ///
    /// Returns `None` on timeout or any socket/parse failure.
    pub fn get_status(&self, ip: Ipv4Addr) -> Option<LampStatus> {
        let result: std::io::Result<LampStatus> = (|| {
            let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
            socket.set_read_timeout(Some(self.config.status_timeout))?;
            socket.send_to(
                &protocol::status_query(),
                SocketAddrV4::new(ip, self.config.control_port),
            )?;

            let mut buf = [0u8; 4096];
            let (len, _addr) = socket.recv_from(&mut buf)?;
            protocol::parse_status_response(&buf[..len]).ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::InvalidData, "unparseable status reply")
            })
        })();

        match result {
            Ok(status) => Some(status),
            Err(e) => {
                debug!("status query to {ip} failed: {e}");
                None
            }
        }
    }

    /// Execute the UDP multicast scan and collect responses.
    fn run_scan(&self) -> Result<Vec<ScanDevice>> {
        let listen = self.bind_listen_socket()?;

        // Send the request from a throwaway socket; a failed send just
        // yields an empty scan, the same as a silent network.
        match self.send_scan_request() {
            Ok(()) => {}
            Err(e) => {
                warn!("failed to send discovery multicast: {e}");
                return Ok(Vec::new());
            }
        }

        let mut devices = Vec::new();
        let deadline = Instant::now() + self.config.scan_timeout;
        let mut buf = [0u8; 4096];

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            if listen.set_read_timeout(Some(deadline - now)).is_err() {
                break;
            }

            match listen.recv_from(&mut buf) {
                Ok((len, addr)) => {
                    if let Some(device) = protocol::parse_scan_response(&buf[..len]) {
                        debug!(
                            "discovered lamp {} at {} (reply from {addr})",
                            device.device_id, device.ip
                        );
                        devices.push(device);
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break;
                }
                Err(e) => {
                    warn!("discovery listen error: {e}");
                    break;
                }
            }
        }

        info!("LAN scan complete: found {} lamp(s)", devices.len());
        Ok(devices)
    }

    fn bind_listen_socket(&self) -> Result<UdpSocket> {
        let bind = || -> std::io::Result<UdpSocket> {
            let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
            socket.set_reuse_address(true)?;
            let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, self.config.listen_port).into();
            socket.bind(&addr.into())?;
            let socket: UdpSocket = socket.into();
            socket.join_multicast_v4(&self.config.multicast_addr, &Ipv4Addr::UNSPECIFIED)?;
            Ok(socket)
        };
        bind().map_err(|e| {
            ControlError::Transport(format!(
                "failed to bind discovery listener on port {}: {e}",
                self.config.listen_port
            ))
        })
    }

    fn send_scan_request(&self) -> std::io::Result<()> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        // Local network only.
        socket.set_multicast_ttl_v4(1)?;
        socket.send_to(
            &protocol::scan_request(),
            SocketAddrV4::new(self.config.multicast_addr, self.config.scan_port),
        )?;
        Ok(())
    }

    fn send_datagram(&self, ip: Ipv4Addr, payload: &[u8]) -> Result<()> {
        let send = || -> std::io::Result<()> {
            let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
            socket.send_to(payload, SocketAddrV4::new(ip, self.config.control_port))?;
            Ok(())
        };
        send().map_err(|e| ControlError::SendDropped(format!("{ip}: {e}")))
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, DeviceCache> {
        // A poisoned lock only means another thread panicked mid-update;
        // the map itself is still usable.
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl LampControl for LanTransport {
    fn resolve_ip(&self, device_id: &str) -> Option<Ipv4Addr> {
        self.get_ip(device_id)
    }

    fn turn(&self, ip: Ipv4Addr, on: bool) -> Result<()> {
        LanTransport::turn(self, ip, on)
    }

    fn set_color(&self, ip: Ipv4Addr, r: u8, g: u8, b: u8) -> Result<()> {
        LanTransport::set_color(self, ip, r, g, b)
    }

    fn set_brightness(&self, ip: Ipv4Addr, value: u8) -> Result<()> {
        LanTransport::set_brightness(self, ip, value)
    }
}
