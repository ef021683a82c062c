//! SSH SOCKS5 tunnel
//!
//! Starts `ssh -D` on a free local port, waits until the SOCKS5 listener
//! answers, and hands back a [`Socks5Dialer`] for it together with the
//! [`ProxyCloser`] that tears the tunnel down again.
//!
//! ```rust,ignore
//! let ctx = Context::background();
//! if let Some((dialer, closer)) = new_proxy_dialer(&ctx, "jump.example.com").await? {
//!     let stream = dialer.dial("bmc.internal:443").await?;
//!     // ...
//!     closer.close().await;
//! }
//! ```

mod command;
mod port;
mod probe;
mod tunnel;

pub use command::{create_ssh_command, ssh_args, SSH_PROGRAM};
pub use port::find_available_port;
pub use probe::{probe_backoff, wait_ready, PROBE_INITIAL_INTERVAL, PROBE_MAX_INTERVAL};
pub use tunnel::{spawn_tunnel, ProxyCloser, Termination, TunnelState};

use crate::config::TunnelOptions;
use crate::error::{BmctlError, Result};
use crate::logging::Context;
use crate::transport::Socks5Dialer;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use tracing::debug;

/// Remote SSH host and the local port its SOCKS5 listener is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    /// Host passed to `ssh`
    pub host: String,
    /// Local port passed to `-D`
    pub local_port: u16,
}

impl ProxyEndpoint {
    /// Create an endpoint for `host` on `local_port`
    pub fn new(host: &str, local_port: u16) -> Self {
        ProxyEndpoint {
            host: host.to_string(),
            local_port,
        }
    }

    /// Loopback address of the SOCKS5 listener
    pub fn local_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.local_port))
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{} -> {}", self.local_port, self.host)
    }
}

/// Start `ssh -D` for `endpoint` and supervise it
pub fn run_socks_proxy(
    ctx: &Context,
    endpoint: &ProxyEndpoint,
    opts: &TunnelOptions,
) -> Result<ProxyCloser> {
    opts.validate().map_err(BmctlError::Config)?;
    // ssh would parse it as an option
    if endpoint.host.starts_with('-') {
        return Err(BmctlError::Config(format!(
            "invalid SSH proxy host {:?}",
            endpoint.host
        )));
    }

    let command = create_ssh_command(&endpoint.host, endpoint.local_port, opts);
    let closer = spawn_tunnel(ctx, command, &endpoint.to_string())?;

    ctx.logger()
        .in_scope(|| debug!("SOCKS5 proxy running at :{}", endpoint.local_port));

    Ok(closer)
}

/// Create a SOCKS5 dialer that routes connections through an SSH tunnel
///
/// An empty `proxy_host` means no proxy is wanted and yields `Ok(None)`.
/// The caller owns the returned [`ProxyCloser`] and must close it when done.
pub async fn new_proxy_dialer(
    ctx: &Context,
    proxy_host: &str,
) -> Result<Option<(Socks5Dialer, ProxyCloser)>> {
    new_proxy_dialer_with_options(ctx, proxy_host, &TunnelOptions::default()).await
}

/// [`new_proxy_dialer`] with explicit tunnel options
///
/// On error no tunnel process is left running.
pub async fn new_proxy_dialer_with_options(
    ctx: &Context,
    proxy_host: &str,
    opts: &TunnelOptions,
) -> Result<Option<(Socks5Dialer, ProxyCloser)>> {
    if proxy_host.is_empty() {
        return Ok(None);
    }

    let endpoint = ProxyEndpoint::new(proxy_host, find_available_port()?);
    let closer = run_socks_proxy(ctx, &endpoint, opts)?;

    let dialer = connect_when_ready(ctx, &endpoint, closer).await?;
    Ok(Some(dialer))
}

/// Wait for the tunnel to accept connections, closing it if it never does
async fn connect_when_ready(
    ctx: &Context,
    endpoint: &ProxyEndpoint,
    closer: ProxyCloser,
) -> Result<(Socks5Dialer, ProxyCloser)> {
    let addr = endpoint.local_addr();

    let ready = tokio::select! {
        ready = wait_ready(ctx, addr) => ready,
        _ = closer.stopped() => Err(BmctlError::NotReady {
            addr,
            reason: "SOCKS5 proxy exited before accepting connections".to_string(),
        }),
    };

    match ready {
        Ok(probe) => {
            // The probe only proves the listener is up
            drop(probe);
            Ok((Socks5Dialer::new(addr), closer))
        }
        Err(err) => {
            let termination = closer.close().await;
            ctx.logger().in_scope(|| {
                debug!("SOCKS5 proxy for {} closed after failed start: {}", endpoint, termination)
            });
            Err(err)
        }
    }
}
