//! SOCKS5 dialing
//!
//! Connects through a local SOCKS5 endpoint such as the one `ssh -D`
//! provides. No authentication is offered; host names are passed to the
//! proxy unresolved so the far end performs the lookup.

use super::{Dialer, SocketOpts, Target, DEFAULT_CONNECT_TIMEOUT_SECS};
use crate::error::{BmctlError, Result};
use async_socks5::AddrKind;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

/// Dialer that routes every connection through a SOCKS5 proxy
#[derive(Debug, Clone)]
pub struct Socks5Dialer {
    /// Address of the SOCKS5 endpoint
    proxy_addr: SocketAddr,
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
    /// Timeout for the TCP connect plus the SOCKS5 handshake
    connect_timeout: Duration,
}

impl Socks5Dialer {
    /// Create a dialer for the SOCKS5 endpoint at `proxy_addr`
    pub fn new(proxy_addr: SocketAddr) -> Self {
        Socks5Dialer {
            proxy_addr,
            socket_opts: SocketOpts::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Address of the SOCKS5 endpoint
    pub fn proxy_addr(&self) -> SocketAddr {
        self.proxy_addr
    }

    async fn connect(&self, target: Target) -> Result<TcpStream> {
        let mut stream = TcpStream::connect(self.proxy_addr).await.map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("SOCKS5 proxy {}: {}", self.proxy_addr, e),
            )
        })?;
        self.socket_opts.apply(&stream)?;

        let addr = match target {
            Target::Ip(addr) => AddrKind::Ip(addr),
            Target::Domain(host, port) => AddrKind::Domain(host, port),
        };
        async_socks5::connect(&mut stream, addr, None).await?;

        Ok(stream)
    }
}

#[async_trait]
impl Dialer for Socks5Dialer {
    async fn dial(&self, addr: &str) -> Result<TcpStream> {
        let target = Target::parse(addr)?;

        let stream = tokio::time::timeout(self.connect_timeout, self.connect(target))
            .await
            .map_err(|_| {
                BmctlError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("SOCKS5 connection to {} timed out", addr),
                ))
            })??;

        tracing::debug!("SOCKS5 connection established to {} via {}", addr, self.proxy_addr);

        Ok(stream)
    }
}
