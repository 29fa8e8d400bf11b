//! Shutdown triggers and connection draining.
//!
//! Stopping the server is two-phase: the listener stops accepting, then the
//! connections it already handed out are given until the shutdown timeout to
//! finish. [`ActiveConnections`] counts the latter.

use std::io;
use std::os::raw::c_int;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::info;

use super::SERVER_TARGET;

/// Signals that start a graceful shutdown.
pub const SHUTDOWN_SIGNALS: [c_int; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Blocks the launch thread until the server should stop accepting.
#[cfg_attr(test, mockall::automock)]
pub trait ShutdownSignal: Send + Sync {
    /// Returns once shutdown has been requested.
    ///
    /// # Errors
    ///
    /// Returns an error when the trigger can no longer fire.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Failures of the shutdown trigger.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Registering the signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The signal stream ended before any signal arrived.
    #[error("signal stream closed before a shutdown signal arrived")]
    Closed,
}

/// Trigger fired by the first of [`SHUTDOWN_SIGNALS`].
///
/// Handlers are registered when the value is built, before the listener
/// starts, so a signal delivered during startup is still observed.
pub struct SystemShutdownSignal {
    signals: Mutex<Signals>,
}

impl SystemShutdownSignal {
    /// Registers handlers for [`SHUTDOWN_SIGNALS`].
    ///
    /// # Errors
    ///
    /// Returns an error when a handler cannot be registered.
    pub fn install() -> Result<Self, ShutdownError> {
        let signals =
            Signals::new(SHUTDOWN_SIGNALS).map_err(|source| ShutdownError::Install { source })?;
        Ok(Self {
            signals: Mutex::new(signals),
        })
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals = self.signals.lock().unwrap_or_else(PoisonError::into_inner);
        let signal = signals.forever().next().ok_or(ShutdownError::Closed)?;
        info!(
            target: SERVER_TARGET,
            signal,
            "shutdown signal received, draining connections"
        );
        Ok(())
    }
}

/// Number of upgraded connections still being served.
#[derive(Debug, Clone, Default)]
pub struct ActiveConnections {
    open: Arc<AtomicUsize>,
}

impl ActiveConnections {
    /// Records a connection as open until the returned guard drops.
    #[must_use]
    pub fn enter(&self) -> OpenConnection {
        self.open.fetch_add(1, Ordering::SeqCst);
        OpenConnection {
            open: Arc::clone(&self.open),
        }
    }

    /// Connections currently open.
    #[must_use]
    pub fn count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    /// Waits up to `timeout` for every open connection to finish and returns
    /// how many are still open afterwards.
    #[must_use]
    pub fn drain(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let open = self.count();
            if open == 0 || Instant::now() >= deadline {
                return open;
            }
            thread::sleep(DRAIN_POLL);
        }
    }
}

/// Keeps one connection counted in [`ActiveConnections`].
#[derive(Debug)]
pub struct OpenConnection {
    open: Arc<AtomicUsize>,
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}
