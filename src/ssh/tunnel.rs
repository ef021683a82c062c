//! Tunnel process supervision
//!
//! A tunnel is a child process plus three tasks: one draining stdout, one
//! draining stderr and a monitor waiting for exit. The monitor is the only
//! task that reports completion. After the process is reaped it gives the
//! drains [`DRAIN_GRACE`] to reach end of file and aborts whichever are left,
//! so once [`ProxyCloser::close`] returns nothing the tunnel spawned is left
//! running in this process.

use crate::error::{BmctlError, Result};
use crate::logging::Context;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, Instrument};

/// How long output readers may outlive the process
///
/// A helper that inherited the pipes, such as a `ProxyCommand`, can keep them
/// open after `ssh` itself is gone.
pub const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle of a tunnel process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// Command built, process not yet launched
    Starting,
    /// Process launched and being monitored
    Running,
    /// Shutdown requested, waiting for the process to exit
    Stopping,
    /// Process exited after a shutdown request or on its own with success
    Stopped,
    /// Process died unexpectedly
    Errored,
}

impl TunnelState {
    /// Whether the process has exited
    pub fn is_terminal(&self) -> bool {
        matches!(self, TunnelState::Stopped | TunnelState::Errored)
    }
}

/// How a tunnel process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// We asked it to stop. The exit status is irrelevant; SSH exits
    /// non-zero when killed.
    Graceful,
    /// It exited successfully without being asked to
    Exited,
    /// It failed on its own, or was killed because the owning context ended
    Abnormal(String),
}

impl Termination {
    /// Whether this termination should be reported as a failure
    pub fn is_abnormal(&self) -> bool {
        matches!(self, Termination::Abnormal(_))
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Graceful => write!(f, "graceful shutdown"),
            Termination::Exited => write!(f, "exited"),
            Termination::Abnormal(reason) => write!(f, "{}", reason),
        }
    }
}

/// Handle that stops a tunnel and waits for it to be gone
///
/// Dropping the handle without calling [`close`](Self::close) still asks the
/// process to stop, but does not wait for it.
#[derive(Debug)]
pub struct ProxyCloser {
    shutdown: CancellationToken,
    done: Option<oneshot::Receiver<Termination>>,
    state: watch::Receiver<TunnelState>,
    pid: Option<u32>,
}

impl ProxyCloser {
    /// Stop the process and wait until it and its output readers have finished
    ///
    /// Returns immediately if the process already exited.
    pub async fn close(mut self) -> Termination {
        self.shutdown.cancel();
        match self.done.take() {
            Some(done) => done.await.unwrap_or_else(|_| {
                Termination::Abnormal("tunnel monitor stopped unexpectedly".to_string())
            }),
            None => Termination::Graceful,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> TunnelState {
        *self.state.borrow()
    }

    /// OS process id, if the process was still running when it was launched
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Resolves once the process has exited, for whatever reason
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        // An Err means the monitor is gone, and so is the process
        let _ = state.wait_for(TunnelState::is_terminal).await;
    }
}

impl Drop for ProxyCloser {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Which pipe a drain task reads
#[derive(Debug, Clone, Copy)]
enum Output {
    Stdout,
    Stderr,
}

/// Launch `command` and supervise it until it exits or is closed
///
/// The command must have stdout and stderr piped. Lines written to stdout are
/// logged at debug level and lines written to stderr at error level, under a
/// span named after `label`. If `ctx` ends, the process is killed and the
/// termination reported as abnormal.
pub fn spawn_tunnel(ctx: &Context, mut command: Command, label: &str) -> Result<ProxyCloser> {
    let (state_tx, state_rx) = watch::channel(TunnelState::Starting);
    let span = ctx
        .logger()
        .in_scope(|| tracing::error_span!("proxy", proxy = %label));

    command.kill_on_drop(true);
    let mut child = command
        .spawn()
        .map_err(|e| BmctlError::TunnelLaunch(e.to_string()))?;

    // Dropping `child` on these paths kills the process
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| BmctlError::TunnelLaunch("could not get stdout".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| BmctlError::TunnelLaunch("could not get stderr".to_string()))?;

    let pid = child.id();
    state_tx.send_replace(TunnelState::Running);

    let logger = ctx.logger();
    let stdout_task =
        tokio::spawn(logger.bind(drain(stdout, Output::Stdout).instrument(span.clone())));
    let stderr_task =
        tokio::spawn(logger.bind(drain(stderr, Output::Stderr).instrument(span.clone())));

    let shutdown = CancellationToken::new();
    let (done_tx, done_rx) = oneshot::channel();
    let monitor = monitor(
        ctx.clone(),
        child,
        shutdown.clone(),
        [stdout_task, stderr_task],
        state_tx,
        done_tx,
    );
    tokio::spawn(logger.bind(monitor.instrument(span)));

    Ok(ProxyCloser {
        shutdown,
        done: Some(done_rx),
        state: state_rx,
        pid,
    })
}

/// Log every line of `reader` until the pipe closes
async fn drain<R: AsyncRead + Unpin>(reader: R, output: Output) {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                let text = text.trim_end();
                match output {
                    Output::Stdout => debug!("{}", text),
                    Output::Stderr => error!("{}", text),
                }
            }
            Err(e) => {
                debug!("Stopped reading {:?}: {}", output, e);
                break;
            }
        }
    }
}

/// Wait for the process to end, then report how it ended
async fn monitor(
    ctx: Context,
    mut child: Child,
    shutdown: CancellationToken,
    mut drains: [JoinHandle<()>; 2],
    state: watch::Sender<TunnelState>,
    done: oneshot::Sender<Termination>,
) {
    let termination = tokio::select! {
        status = child.wait() => {
            if shutdown.is_cancelled() {
                Termination::Graceful
            } else {
                match status {
                    Ok(status) if status.success() => Termination::Exited,
                    Ok(status) => Termination::Abnormal(status.to_string()),
                    Err(e) => Termination::Abnormal(e.to_string()),
                }
            }
        }
        _ = shutdown.cancelled() => {
            state.send_replace(TunnelState::Stopping);
            kill(&mut child).await;
            Termination::Graceful
        }
        reason = ctx.done() => {
            state.send_replace(TunnelState::Stopping);
            kill(&mut child).await;
            Termination::Abnormal(reason.to_string())
        }
    };

    let joined = tokio::time::timeout(
        DRAIN_GRACE,
        futures::future::join_all(drains.iter_mut()),
    )
    .await;
    if joined.is_err() {
        debug!("Tunnel output still open after exit, no longer reading it");
        for task in &drains {
            task.abort();
        }
    }

    if termination.is_abnormal() {
        error!("SOCKS5 proxy exited with an error: {}", termination);
        state.send_replace(TunnelState::Errored);
    } else {
        debug!("SOCKS5 proxy exited");
        state.send_replace(TunnelState::Stopped);
    }

    // The closer may have been dropped without waiting
    let _ = done.send(termination);
}

async fn kill(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!("Failed to signal tunnel process: {}", e);
    }
    if let Err(e) = child.wait().await {
        debug!("Failed to reap tunnel process: {}", e);
    }
}
