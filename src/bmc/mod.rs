//! Redfish BMC client
//!
//! Wires the tunnel and the HTTP client together and performs the session
//! handshake with the BMC.

mod client;
mod service_root;

pub use client::{Client, AUTH_TOKEN_HEADER};
pub use service_root::{Link, ServiceRoot, ServiceRootLinks};
