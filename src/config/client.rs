//! Client configuration types
//!
//! Defines the connection settings for a single BMC endpoint.

use super::TunnelOptions;
use serde::{Deserialize, Serialize};
use url::Url;

/// RFC 1035 hostname limit
const MAX_ENDPOINT_LENGTH: usize = 253;
const MAX_USER_LENGTH: usize = 64;
const MAX_PASSWORD_LENGTH: usize = 128;
/// Same as hostname
const MAX_SSH_PROXY_LENGTH: usize = 253;

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Client configuration
    pub client: ClientConfig,

    /// Tunnel configuration
    #[serde(default)]
    pub tunnel: TunnelOptions,
}

/// Connection settings for a BMC endpoint
///
/// Owned by the caller and never mutated by the library.
#[derive(Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    /// BMC endpoint URL (e.g., "https://bmc.example.com")
    pub endpoint: Url,

    /// BMC user
    #[serde(default)]
    pub user: String,

    /// BMC password
    #[serde(default)]
    pub password: String,

    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure: bool,

    /// SSH host to tunnel through; empty for a direct connection
    #[serde(default)]
    pub ssh_proxy: String,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint.as_str())
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("insecure", &self.insecure)
            .field("ssh_proxy", &self.ssh_proxy)
            .finish()
    }
}

impl ClientConfig {
    /// Create a configuration for a direct, verified connection
    pub fn new(endpoint: Url, user: &str, password: &str) -> Self {
        ClientConfig {
            endpoint,
            user: user.to_string(),
            password: password.to_string(),
            insecure: false,
            ssh_proxy: String::new(),
        }
    }

    /// Whether traffic should be tunneled over SSH
    pub fn uses_ssh_proxy(&self) -> bool {
        !self.ssh_proxy.is_empty()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        match self.endpoint.scheme() {
            "https" | "http" => {}
            _ => return Err("endpoint must be a valid http(s) URL".to_string()),
        }

        if self.endpoint.as_str().len() > MAX_ENDPOINT_LENGTH {
            return Err(format!(
                "endpoint URL too long (max {} characters)",
                MAX_ENDPOINT_LENGTH
            ));
        }

        if self.user.len() > MAX_USER_LENGTH {
            return Err(format!("user too long (max {} characters)", MAX_USER_LENGTH));
        }

        if self.password.len() > MAX_PASSWORD_LENGTH {
            return Err(format!(
                "password too long (max {} characters)",
                MAX_PASSWORD_LENGTH
            ));
        }

        if self.ssh_proxy.len() > MAX_SSH_PROXY_LENGTH {
            return Err(format!(
                "ssh-proxy too long (max {} characters)",
                MAX_SSH_PROXY_LENGTH
            ));
        }

        if self.ssh_proxy.starts_with('-') {
            return Err("ssh-proxy must not start with '-'".to_string());
        }

        Ok(())
    }
}
