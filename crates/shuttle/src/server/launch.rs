//! Starts the WebSocket listener and supervises it until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use shuttle_config::Config;

use crate::demo::{self, DemoTimings};
use crate::dispatch::{Connection, DispatchLimits};
use crate::telemetry;
use crate::transport::{ListenerHandle, SocketListener, WebSocketTransport, WebSocketUpgrade};

use super::SERVER_TARGET;
use super::errors::ServeError;
use super::loader::{ConfigLoader, SystemConfigLoader};
use super::shutdown::{ActiveConnections, ShutdownSignal, SystemShutdownSignal};

/// A listener accepting WebSocket connections on the configured endpoint.
pub struct RunningServer {
    local_addr: Option<SocketAddr>,
    handle: ListenerHandle,
    connections: ActiveConnections,
    shutdown_timeout: Duration,
}

impl RunningServer {
    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Connections currently being served.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.connections.count()
    }

    /// Stops accepting, then waits for open connections to finish.
    ///
    /// Both phases share the configured shutdown timeout. Returns the number
    /// of connections still open when it ran out; those are left running.
    ///
    /// # Errors
    ///
    /// Returns an error when the accept thread panicked.
    pub fn stop(self) -> Result<usize, ServeError> {
        let deadline = Instant::now() + self.shutdown_timeout;
        self.handle.shutdown();
        if !self.handle.join_within(self.shutdown_timeout)? {
            warn!(
                target: SERVER_TARGET,
                timeout_ms = self.shutdown_timeout.as_millis(),
                "listener did not stop within the shutdown timeout"
            );
        }
        let draining = self.connections.count();
        if draining > 0 {
            info!(target: SERVER_TARGET, draining, "waiting for open connections");
        }
        let remaining = self
            .connections
            .drain(deadline.saturating_duration_since(Instant::now()));
        if remaining > 0 {
            warn!(
                target: SERVER_TARGET,
                remaining,
                "connections still open after the shutdown timeout"
            );
        }
        Ok(remaining)
    }
}

/// Binds the configured endpoint and serves the echo handlers on it.
///
/// # Errors
///
/// Returns an error when the endpoint cannot be bound or the accept thread
/// cannot be started.
pub fn start(config: &Config, timings: DemoTimings) -> Result<RunningServer, ServeError> {
    let endpoint = config.endpoint();
    let listener = SocketListener::bind(endpoint)?;
    let local_addr = listener.local_addr();
    let codec = config.codec();
    let limits = DispatchLimits {
        max_in_flight: config.max_in_flight(),
        handler_deadline: config.handler_timeout(),
    };
    let connections = ActiveConnections::default();
    let tracked = connections.clone();
    let setup = move |connection: Connection<WebSocketTransport>| {
        let _open = tracked.enter();
        demo::register(connection.limits(limits), codec, timings).listen()
    };
    let upgrade = WebSocketUpgrade::new(endpoint.path(), setup);
    let handle = listener.start(Arc::new(upgrade))?;
    info!(
        target: SERVER_TARGET,
        %endpoint,
        %codec,
        ?local_addr,
        "server ready"
    );
    Ok(RunningServer {
        local_addr,
        handle,
        connections,
        shutdown_timeout: config.shutdown_timeout(),
    })
}

/// Runs the echo server using the production collaborators.
///
/// # Errors
///
/// Returns an error when configuration, telemetry, the listener or signal
/// handling fails.
pub fn run_server() -> Result<(), ServeError> {
    let shutdown = SystemShutdownSignal::install()?;
    run_server_with(&SystemConfigLoader, &shutdown, DemoTimings::default())
}

/// Runs the echo server with injected collaborators until `shutdown` fires,
/// then drains its connections.
///
/// # Errors
///
/// Returns an error when configuration, telemetry, the listener or signal
/// handling fails.
pub fn run_server_with(
    loader: &dyn ConfigLoader,
    shutdown: &dyn ShutdownSignal,
    timings: DemoTimings,
) -> Result<(), ServeError> {
    let config = load_config(loader)?;
    telemetry::initialise(&config)?;
    let server = start(&config, timings)?;
    let waited = shutdown.wait();
    let remaining = server.stop()?;
    waited?;
    info!(target: SERVER_TARGET, remaining, "shutdown sequence completed");
    Ok(())
}

fn load_config(loader: &dyn ConfigLoader) -> Result<Config, ServeError> {
    loader.load().map_err(|source| ServeError::Config { source })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use shuttle_config::{LogFormat, ServerEndpoint};

    use super::*;
    use crate::server::loader::StaticConfigLoader;
    use crate::server::shutdown::{MockShutdownSignal, ShutdownError};

    fn local_config() -> Config {
        Config {
            endpoint: ServerEndpoint::new("127.0.0.1", 0, "/echo"),
            log_format: LogFormat::Compact,
            shutdown_timeout_ms: 1_000,
            ..Config::default()
        }
    }

    #[rstest]
    fn start_binds_an_ephemeral_port() {
        let server = start(&local_config(), DemoTimings::instant()).expect("server starts");
        let addr = server.local_addr().expect("bound address");
        assert_ne!(addr.port(), 0);
        assert_eq!(server.stop().expect("server stops"), 0);
    }

    #[rstest]
    fn run_returns_once_shutdown_fires() {
        let mut shutdown = MockShutdownSignal::new();
        shutdown.expect_wait().times(1).returning(|| Ok(()));
        run_server_with(
            &StaticConfigLoader::new(local_config()),
            &shutdown,
            DemoTimings::instant(),
        )
        .expect("server runs and stops");
    }

    #[rstest]
    fn a_failed_trigger_still_stops_the_listener() {
        let mut shutdown = MockShutdownSignal::new();
        shutdown
            .expect_wait()
            .times(1)
            .returning(|| Err(ShutdownError::Closed));
        let error = run_server_with(
            &StaticConfigLoader::new(local_config()),
            &shutdown,
            DemoTimings::instant(),
        )
        .expect_err("trigger failure is reported");
        assert!(matches!(error, ServeError::Shutdown(ShutdownError::Closed)));
    }
}
