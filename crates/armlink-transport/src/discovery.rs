//! LAN discovery of WiFi-attached devices.
//!
//! A probe string is broadcast on every up, broadcast-capable IPv4 interface;
//! devices answer with their own address as text.

use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// UDP port devices listen on for discovery probes.
pub const DISCOVERY_PORT: u16 = 48899;

/// Local port replies are sent back to.
pub const DISCOVERY_LOCAL_PORT: u16 = 2046;

/// Probe payload.
pub const DISCOVERY_KEYWORD: &str = "Who is Dobot?";

/// How long replies are collected by default.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a discovery sweep.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Local port to bind (replies arrive here).
    pub local_port: u16,
    /// Remote port probes are sent to.
    pub remote_port: u16,
    /// Total time to collect replies.
    pub timeout: Duration,
    /// Explicit probe targets. `None` probes every interface's subnet broadcast.
    pub targets: Option<Vec<Ipv4Addr>>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            local_port: DISCOVERY_LOCAL_PORT,
            remote_port: DISCOVERY_PORT,
            timeout: DEFAULT_DISCOVERY_TIMEOUT,
            targets: None,
        }
    }
}

/// Broadcast a discovery probe and collect device addresses (blocking).
pub fn discover(config: &DiscoveryConfig) -> Result<Vec<SocketAddr>> {
    let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.local_port);
    let socket = UdpSocket::bind(bind_addr).map_err(|source| TransportError::Connect {
        endpoint: bind_addr.to_string(),
        source,
    })?;
    socket.set_broadcast(true)?;

    let targets = match &config.targets {
        Some(targets) => targets.clone(),
        None => broadcast_addresses(),
    };

    for target in &targets {
        let dest = SocketAddrV4::new(*target, config.remote_port);
        match socket.send_to(DISCOVERY_KEYWORD.as_bytes(), dest) {
            Ok(_) => debug!(%dest, "sent discovery probe"),
            Err(err) => debug!(%dest, %err, "discovery probe failed"),
        }
    }

    let deadline = Instant::now() + config.timeout;
    let mut found: Vec<SocketAddr> = Vec::new();
    let mut buf = [0u8; 1024];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        socket.set_read_timeout(Some(remaining))?;

        let (n, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if n == 0 {
            continue;
        }

        let text = String::from_utf8_lossy(&buf[..n]);
        if is_device_reply(text.trim(), from) && !found.contains(&from) {
            info!(%from, "discovered device");
            found.push(from);
        }
    }

    Ok(found)
}

/// A device answers with the address it was reached on.
fn is_device_reply(text: &str, from: SocketAddr) -> bool {
    text == from.to_string() || text == from.ip().to_string()
}

/// Directed broadcast address of `ip` within `netmask`.
pub fn subnet_broadcast(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(netmask))
}

#[cfg(unix)]
fn broadcast_addresses() -> Vec<Ipv4Addr> {
    let mut addrs = Vec::new();
    let mut ifap: *mut libc::ifaddrs = std::ptr::null_mut();

    // SAFETY: `ifap` is a valid out-pointer; on success it receives a list
    // that stays alive until the matching `freeifaddrs` below.
    if unsafe { libc::getifaddrs(&mut ifap) } != 0 {
        debug!("getifaddrs failed, using limited broadcast");
        return vec![Ipv4Addr::BROADCAST];
    }

    let mut cursor = ifap;
    while !cursor.is_null() {
        // SAFETY: `cursor` is a non-null node of the list returned above.
        let ifa = unsafe { &*cursor };
        cursor = ifa.ifa_next;

        let flags = ifa.ifa_flags as libc::c_int;
        if flags & libc::IFF_UP == 0
            || flags & libc::IFF_BROADCAST == 0
            || flags & libc::IFF_LOOPBACK != 0
        {
            continue;
        }

        let (Some(ip), Some(mask)) = (sockaddr_ipv4(ifa.ifa_addr), sockaddr_ipv4(ifa.ifa_netmask))
        else {
            continue;
        };

        let broadcast = subnet_broadcast(ip, mask);
        if !addrs.contains(&broadcast) {
            addrs.push(broadcast);
        }
    }

    // SAFETY: `ifap` came from a successful `getifaddrs` and is freed once.
    unsafe { libc::freeifaddrs(ifap) };

    addrs
}

#[cfg(unix)]
fn sockaddr_ipv4(sa: *const libc::sockaddr) -> Option<Ipv4Addr> {
    if sa.is_null() {
        return None;
    }
    // SAFETY: `sa` is non-null and points at a sockaddr owned by the ifaddrs
    // list; the family is checked before reinterpreting it as `sockaddr_in`.
    unsafe {
        if (*sa).sa_family as libc::c_int != libc::AF_INET {
            return None;
        }
        let sin = &*(sa as *const libc::sockaddr_in);
        Some(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)))
    }
}

#[cfg(not(unix))]
fn broadcast_addresses() -> Vec<Ipv4Addr> {
    vec![Ipv4Addr::BROADCAST]
}
