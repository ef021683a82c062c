//! # bmctl - Out-of-band device management via the BMC interface
//!
//! bmctl talks Redfish to baseboard management controllers. BMCs usually sit
//! on a management network that is only reachable through a jump host, so
//! every connection can optionally be routed through an SSH dynamic port
//! forward (`ssh -D`) that the library starts, supervises and tears down.
//!
//! ## Features
//!
//! - **SSH SOCKS5 tunnel**: `ssh -D` on a free local port, with readiness
//!   probing and supervised shutdown
//! - **Dialer abstraction**: direct or SOCKS5 connections behind one trait
//! - **Service root repair**: adds the `Links.Sessions` member some firmware
//!   forgets, so session login works
//! - **TLS**: platform roots by default, verification can be turned off for
//!   self-signed BMC certificates
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bmctl::bmc::Client;
//! use bmctl::config::ClientConfig;
//! use bmctl::logging::Context;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = Context::background();
//!     let mut config = ClientConfig::new("https://bmc01".parse()?, "admin", "secret");
//!     config.ssh_proxy = "jump.example.com".to_string();
//!
//!     let client = Client::connect(&ctx, &config).await?;
//!     client.boot(&ctx, "http://images/rescue.iso").await?;
//!     client.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Client -> ModifierTransport -> hyper -> Dialer -> ssh -D (SOCKS5) -> BMC
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod bmc;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod ssh;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, ClientConfig, Config, TunnelOptions};
pub use error::{BmctlError, Result};
pub use http::new_http_client;
pub use logging::{Context, Logger};
pub use ssh::{new_proxy_dialer, ProxyCloser};

/// Version of the bmctl library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
