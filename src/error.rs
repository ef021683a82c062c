//! Error types for bmctl
//!
//! This module defines the error type shared by the tunnel, transport and
//! HTTP layers. The binary and the high-level BMC client wrap these with
//! `anyhow` context.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, BmctlError>;

/// Main error type for bmctl operations
#[derive(Error, Debug)]
pub enum BmctlError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No local port could be reserved for the tunnel
    #[error("failed to find available port: {0}")]
    PortAllocation(#[source] io::Error),

    /// The tunnel subprocess could not be launched
    #[error("could not start SOCKS5 proxy: {0}")]
    TunnelLaunch(String),

    /// The tunnel endpoint never accepted a connection
    #[error("SOCKS5 proxy at {addr} not available: {reason}")]
    NotReady {
        /// Address that was probed
        addr: SocketAddr,
        /// Why probing stopped, including the last connection error
        reason: String,
    },

    /// SOCKS5 handshake error
    #[error("SOCKS5 error: {0}")]
    Socks5(#[from] async_socks5::Error),

    /// TLS setup error
    #[error("TLS error: {0}")]
    Tls(#[from] tokio_rustls::rustls::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl From<hyper::Error> for BmctlError {
    fn from(err: hyper::Error) -> Self {
        BmctlError::Http(err.to_string())
    }
}

impl From<hyper_util::client::legacy::Error> for BmctlError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        // The legacy client hides the interesting part in the source chain
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        BmctlError::Http(message)
    }
}

impl From<http::Error> for BmctlError {
    fn from(err: http::Error) -> Self {
        BmctlError::Http(err.to_string())
    }
}
