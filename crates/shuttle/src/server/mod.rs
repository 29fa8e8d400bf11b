//! Server launch sequencing: configuration, telemetry, listener, signals and
//! connection draining.

mod errors;
mod launch;
mod loader;
mod shutdown;

pub use errors::ServeError;
pub use launch::{RunningServer, run_server, run_server_with, start};
pub use loader::{ConfigLoader, StaticConfigLoader, SystemConfigLoader};
pub use shutdown::{
    ActiveConnections, OpenConnection, SHUTDOWN_SIGNALS, ShutdownError, ShutdownSignal,
    SystemShutdownSignal,
};

pub(crate) const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");
