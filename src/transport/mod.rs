//! Transport module for bmctl
//!
//! This module provides the connection-level building blocks used by the
//! HTTP client: the [`Dialer`] abstraction with direct and SOCKS5
//! implementations, socket tuning, and TLS client configuration.

mod socks;
mod tcp;
mod tls;

pub use socks::Socks5Dialer;
pub use tcp::DirectDialer;
pub use tls::{build_tls_config, NoVerifier};

use crate::error::{BmctlError, Result};
use async_trait::async_trait;
use std::fmt::Debug;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;

/// Default connection timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Socket options for configuring connections
#[derive(Debug, Clone)]
pub struct SocketOpts {
    /// Enable TCP_NODELAY
    pub nodelay: bool,
    /// TCP keepalive timeout
    pub keepalive_secs: Option<u64>,
    /// TCP keepalive interval
    pub keepalive_interval: Option<u64>,
}

impl Default for SocketOpts {
    fn default() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: Some(30),
            keepalive_interval: Some(10),
        }
    }
}

impl SocketOpts {
    /// Socket options for the short-lived readiness probe
    pub fn for_probe() -> Self {
        SocketOpts {
            nodelay: true,
            keepalive_secs: None,
            keepalive_interval: None,
        }
    }

    /// Apply socket options to a TCP stream
    pub fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_nodelay(self.nodelay)?;

        if let (Some(timeout), Some(interval)) = (self.keepalive_secs, self.keepalive_interval) {
            let socket = socket2::SockRef::from(stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(Duration::from_secs(timeout))
                .with_interval(Duration::from_secs(interval));
            socket.set_tcp_keepalive(&keepalive)?;
        }

        Ok(())
    }
}

/// Capability to open TCP connections to `host:port` addresses
///
/// The HTTP client never dials directly; it goes through a `Dialer` so
/// that connections can be routed through a tunnel.
#[async_trait]
pub trait Dialer: Debug + Send + Sync + 'static {
    /// Open a connection to `addr`
    async fn dial(&self, addr: &str) -> Result<TcpStream>;
}

/// Target of a dial, split into host and port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Literal IP address
    Ip(SocketAddr),
    /// Host name, resolved by whoever makes the connection
    Domain(String, u16),
}

impl Target {
    /// Parse `host:port`, `[v6]:port` or `ip:port`
    pub fn parse(addr: &str) -> Result<Self> {
        if let Ok(sock) = addr.parse::<SocketAddr>() {
            return Ok(Target::Ip(sock));
        }

        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| BmctlError::InvalidAddress(format!("missing port in {}", addr)))?;
        let port: u16 = port
            .parse()
            .map_err(|_| BmctlError::InvalidAddress(format!("invalid port in {}", addr)))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(BmctlError::InvalidAddress(format!("missing host in {}", addr)));
        }

        match host.parse::<IpAddr>() {
            Ok(ip) => Ok(Target::Ip(SocketAddr::new(ip, port))),
            Err(_) => Ok(Target::Domain(host.to_string(), port)),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Ip(addr) => write!(f, "{}", addr),
            Target::Domain(host, port) => write!(f, "{}:{}", host, port),
        }
    }
}
