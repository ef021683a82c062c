//! Logging and request context
//!
//! Every entry point of the library takes an explicit [`Context`]. It carries
//! the [`Logger`] that tasks spawned on behalf of the caller log through,
//! plus cancellation and an optional deadline.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument::{WithDispatch, WithSubscriber};
use tracing::{Dispatch, Level};
use tracing_subscriber::FmtSubscriber;

/// Handle to a tracing dispatcher
///
/// Cloning is cheap; all clones write to the same subscriber.
#[derive(Clone, Debug)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    /// Create a stderr logger with the given maximum level
    pub fn new(level: Level, json: bool) -> Self {
        let dispatch = if json {
            Dispatch::new(
                FmtSubscriber::builder()
                    .with_max_level(level)
                    .with_writer(std::io::stderr)
                    .json()
                    .finish(),
            )
        } else {
            Dispatch::new(
                FmtSubscriber::builder()
                    .with_max_level(level)
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_thread_names(false)
                    .finish(),
            )
        };
        Logger { dispatch }
    }

    /// Capture whatever dispatcher is in effect for the calling thread
    ///
    /// This is the global subscriber if one was installed, or the no-op
    /// dispatcher otherwise.
    pub fn current() -> Self {
        Logger {
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    /// A logger that drops every event
    pub fn disabled() -> Self {
        Logger {
            dispatch: Dispatch::none(),
        }
    }

    /// Wrap an existing dispatcher
    pub fn from_dispatch(dispatch: Dispatch) -> Self {
        Logger { dispatch }
    }

    /// The underlying dispatcher
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Bind a future to this logger so it logs here no matter where it runs
    pub fn bind<F: Future>(&self, fut: F) -> WithDispatch<F> {
        fut.with_subscriber(self.dispatch.clone())
    }

    /// Run a closure with this logger as the thread's default
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl From<Dispatch> for Logger {
    fn from(dispatch: Dispatch) -> Self {
        Logger::from_dispatch(dispatch)
    }
}

/// Parse a log level name, falling back to `info`
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Cancellation scope carrying a logger and an optional deadline
#[derive(Clone, Debug)]
pub struct Context {
    logger: Logger,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Create a root context that logs through `logger`
    pub fn new(logger: Logger) -> Self {
        Context {
            logger,
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Root context using the dispatcher currently in effect
    pub fn background() -> Self {
        Context::new(Logger::current())
    }

    /// Derive a context that is cancelled with this one
    pub fn child(&self) -> Self {
        Context {
            logger: self.logger.clone(),
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a context that expires after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a context that expires at `deadline` (or earlier, if this one does)
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut ctx = self.child();
        ctx.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        ctx
    }

    /// Derive a context that logs through a different logger
    pub fn with_logger(&self, logger: Logger) -> Self {
        let mut ctx = self.child();
        ctx.logger = logger;
        ctx
    }

    /// Logger attached to this context
    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this context and every context derived from it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the context was cancelled or its deadline passed
    pub fn is_done(&self) -> bool {
        self.cancel.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Token that fires when this context is explicitly cancelled
    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> DoneReason {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => DoneReason::Cancelled,
                _ = tokio::time::sleep_until(deadline) => DoneReason::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                DoneReason::Cancelled
            }
        }
    }
}

/// Why a [`Context`] finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// `cancel()` was called on the context or a parent
    Cancelled,
    /// The deadline passed
    DeadlineExceeded,
}

impl std::fmt::Display for DoneReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DoneReason::Cancelled => write!(f, "context canceled"),
            DoneReason::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}
