//! Readiness probing
//!
//! The SSH client opens its SOCKS5 listener some time after it starts. We poll
//! the port with exponential backoff until a TCP connect succeeds.

use crate::error::{BmctlError, Result};
use crate::logging::Context;
use crate::transport::SocketOpts;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::trace;

/// Delay before the second connection attempt
pub const PROBE_INITIAL_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound for the delay between attempts
pub const PROBE_MAX_INTERVAL: Duration = Duration::from_secs(1);

/// Backoff policy for readiness probing
pub fn probe_backoff() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(PROBE_INITIAL_INTERVAL)
        .with_randomization_factor(backoff::default::RANDOMIZATION_FACTOR)
        .with_multiplier(backoff::default::MULTIPLIER)
        .with_max_interval(PROBE_MAX_INTERVAL)
        .build()
}

/// Connect to `addr` repeatedly until it accepts, or `ctx` ends
///
/// Returns the first successful connection. On failure the error carries
/// the last connection error seen.
pub async fn wait_ready(ctx: &Context, addr: SocketAddr) -> Result<TcpStream> {
    ctx.logger().bind(probe(ctx, addr)).await
}

async fn probe(ctx: &Context, addr: SocketAddr) -> Result<TcpStream> {
    let mut last_error: Option<io::Error> = None;
    let mut attempts = 0u32;

    let outcome = {
        let probe = backoff::future::retry_notify(
            probe_backoff(),
            move || async move {
                TcpStream::connect(addr)
                    .await
                    .map_err(backoff::Error::transient)
            },
            |err: io::Error, next: Duration| {
                attempts += 1;
                trace!("{} not ready ({}), retrying in {:?}", addr, err, next);
                last_error = Some(err);
            },
        );

        tokio::select! {
            result = probe => Ok(result),
            reason = ctx.done() => Err(reason),
        }
    };

    match outcome {
        Ok(Ok(stream)) => {
            SocketOpts::for_probe().apply(&stream)?;
            tracing::debug!("{} ready after {} failed attempts", addr, attempts);
            Ok(stream)
        }
        Ok(Err(err)) => Err(BmctlError::NotReady {
            addr,
            reason: format!("gave up retrying: {}", err),
        }),
        Err(reason) => Err(BmctlError::NotReady {
            addr,
            reason: match last_error {
                Some(err) => format!("{}; last error: {}", reason, err),
                None => reason.to_string(),
            },
        }),
    }
}
