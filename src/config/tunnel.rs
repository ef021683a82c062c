//! Tunnel configuration
//!
//! Keep-alive settings handed to the SSH client that provides the SOCKS5
//! forwarding.

use serde::{Deserialize, Serialize};

/// Default `ServerAliveInterval` in seconds
fn default_server_alive_interval() -> u32 {
    30
}

/// Default `ServerAliveCountMax`
fn default_server_alive_count_max() -> u32 {
    3
}

/// SSH tunnel options
///
/// Fixed for the lifetime of a tunnel once it has been started.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct TunnelOptions {
    /// Seconds between keep-alive probes sent to the SSH server
    #[serde(default = "default_server_alive_interval")]
    pub server_alive_interval: u32,

    /// Unanswered keep-alive probes before the connection is dropped
    #[serde(default = "default_server_alive_count_max")]
    pub server_alive_count_max: u32,
}

impl Default for TunnelOptions {
    fn default() -> Self {
        TunnelOptions {
            server_alive_interval: default_server_alive_interval(),
            server_alive_count_max: default_server_alive_count_max(),
        }
    }
}

impl TunnelOptions {
    /// Create options with explicit keep-alive settings
    pub fn new(server_alive_interval: u32, server_alive_count_max: u32) -> Self {
        TunnelOptions {
            server_alive_interval,
            server_alive_count_max,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server_alive_interval == 0 {
            return Err("server_alive_interval must be positive".to_string());
        }
        if self.server_alive_count_max == 0 {
            return Err("server_alive_count_max must be positive".to_string());
        }
        Ok(())
    }
}
