//! Local port allocation
//!
//! The tunnel needs a free loopback port for its SOCKS5 listener. The port is
//! reserved only for the instant it takes to read it back, so the SSH client
//! may still lose a race for it; that surfaces as a startup failure.

use crate::error::{BmctlError, Result};
use std::net::{Ipv4Addr, TcpListener};

/// Find a free TCP port on 127.0.0.1
pub fn find_available_port() -> Result<u16> {
    let listener =
        TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(BmctlError::PortAllocation)?;
    let port = listener
        .local_addr()
        .map_err(BmctlError::PortAllocation)?
        .port();

    Ok(port)
}
