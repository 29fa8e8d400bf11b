//! Layered configuration shared by the Shuttle binaries.
//!
//! Values resolve in increasing precedence: built-in defaults, a TOML file
//! named with `--config-path` (or `SHUTTLE_CONFIG_PATH`), `SHUTTLE_*`
//! environment variables, then command-line flags. Loading is delegated to
//! [`ortho_config`], which aggregates every failing source into one error.

mod defaults;
mod endpoint;
mod logging;

use std::num::NonZeroUsize;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_PATH, DEFAULT_PORT, DEFAULT_SHUTDOWN_TIMEOUT_MS,
    default_codec, default_endpoint, default_log_filter, default_log_format,
};
pub use endpoint::{EndpointParseError, ServerEndpoint};
pub use logging::{CodecKind, EnumParseError, LogFormat};

/// Resolved configuration for the echo server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, OrthoConfig)]
#[serde(default)]
#[ortho_config(prefix = "SHUTTLE")]
pub struct Config {
    /// Endpoint the server listens on.
    pub endpoint: ServerEndpoint,
    /// `tracing` filter expression.
    pub log_filter: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Codec registered on every accepted connection.
    pub codec: CodecKind,
    /// Maximum number of handler tasks running at once per connection.
    pub max_in_flight: Option<usize>,
    /// Per-handler deadline in milliseconds.
    pub handler_timeout_ms: Option<u64>,
    /// Time allowed for the listener to stop once shutdown is requested.
    pub shutdown_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: default_log_format(),
            codec: default_codec(),
            max_in_flight: None,
            handler_timeout_ms: None,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Endpoint the server listens on.
    #[must_use]
    pub const fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Codec registered on every accepted connection.
    #[must_use]
    pub const fn codec(&self) -> CodecKind {
        self.codec
    }

    /// Admission limit for concurrent handler tasks. Zero means unlimited.
    #[must_use]
    pub fn max_in_flight(&self) -> Option<NonZeroUsize> {
        self.max_in_flight.and_then(NonZeroUsize::new)
    }

    /// Per-handler deadline, if one is configured.
    #[must_use]
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
    }

    /// Time allowed for the listener to stop.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_documented_values() {
        let config = Config::default();
        assert_eq!(config.endpoint().to_string(), "ws://localhost:8080/echo");
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.codec(), CodecKind::Json);
        assert!(config.max_in_flight().is_none());
        assert!(config.handler_timeout().is_none());
    }

    #[test]
    fn zero_limits_mean_unlimited() {
        let config = Config {
            max_in_flight: Some(0),
            handler_timeout_ms: Some(0),
            ..Config::default()
        };
        assert!(config.max_in_flight().is_none());
        assert!(config.handler_timeout().is_none());
    }
}
