use crate::endpoint::ServerEndpoint;
use crate::logging::{CodecKind, LogFormat};

/// Default TCP port the echo server binds.
pub const DEFAULT_PORT: u16 = 8080;

/// Default host the echo server binds.
pub const DEFAULT_HOST: &str = "localhost";

/// Default upgrade path, matching the demo clients.
pub const DEFAULT_PATH: &str = "/echo";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default time the server waits for its listener to stop, in milliseconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 5_000;

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default codec registered on each connection.
#[must_use]
pub const fn default_codec() -> CodecKind {
    CodecKind::Json
}

/// Computes the default listening endpoint.
#[must_use]
pub fn default_endpoint() -> ServerEndpoint {
    ServerEndpoint::new(DEFAULT_HOST, DEFAULT_PORT, DEFAULT_PATH)
}
