//! LAN address discovery.
//!
//! Connecting a UDP socket sends nothing on the wire, but it makes the OS pick
//! the interface and source address it would use to reach the target. That
//! address is what other devices on the LAN should type into their browser.
//! The result is only displayed; it is never used to bind or filter.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use crate::config::DISCOVERY_TARGET_ADDR;

/// Address shown when discovery fails.
pub const LOOPBACK_FALLBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Why the outbound address could not be determined.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to create UDP socket: {0}")]
    Socket(#[source] io::Error),

    #[error("no route to {target}: {source}")]
    Unreachable {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read local socket address: {0}")]
    LocalAddr(#[source] io::Error),

    #[error("OS reported an unspecified local address")]
    Unspecified,
}

/// Ask the OS which local IPv4 address it would use to reach `target`.
pub fn route_local_ip<A: ToSocketAddrs + ToString>(target: A) -> Result<IpAddr, DiscoveryError> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
        .map_err(DiscoveryError::Socket)?;

    socket
        .connect(&target)
        .map_err(|source| DiscoveryError::Unreachable {
            target: target.to_string(),
            source,
        })?;

    let ip = socket.local_addr().map_err(DiscoveryError::LocalAddr)?.ip();

    if ip.is_unspecified() {
        return Err(DiscoveryError::Unspecified);
    }

    Ok(ip)
}

/// Best-effort LAN address, falling back to `127.0.0.1`.
pub fn discover_local_ip() -> IpAddr {
    discover_local_ip_via(DISCOVERY_TARGET_ADDR)
}

/// Same as [`discover_local_ip`] with a caller-chosen target.
pub fn discover_local_ip_via(target: &str) -> IpAddr {
    match route_local_ip(target) {
        Ok(ip) => {
            tracing::debug!(%ip, via = target, "Discovered LAN address");
            ip
        }
        Err(e) => {
            tracing::debug!(error = %e, fallback = %LOOPBACK_FALLBACK, "LAN address discovery failed");
            LOOPBACK_FALLBACK
        }
    }
}
