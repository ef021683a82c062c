//! Direct TCP dialing
//!
//! Used when no tunnel was requested.

use super::{Dialer, SocketOpts, DEFAULT_CONNECT_TIMEOUT_SECS};
use crate::error::{BmctlError, Result};
use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

/// Dialer that connects straight to the target
#[derive(Debug, Clone)]
pub struct DirectDialer {
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
    /// Connection timeout
    connect_timeout: Duration,
}

impl Default for DirectDialer {
    fn default() -> Self {
        DirectDialer {
            socket_opts: SocketOpts::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl DirectDialer {
    /// Create a new direct dialer with default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set socket options
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, addr: &str) -> Result<TcpStream> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connection timeout to {}", addr),
                )
            })?
            .map_err(|e| BmctlError::Io(io::Error::new(e.kind(), format!("{}: {}", addr, e))))?;

        self.socket_opts.apply(&stream)?;

        tracing::debug!("TCP connection established to {}", addr);

        Ok(stream)
    }
}
