//! Error types for the transport layer.

use std::io;
use std::net::SocketAddr;
use std::string::FromUtf8Error;

use thiserror::Error;

/// Errors surfaced while reading, writing or closing a framed transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the connection, or it was closed locally.
    #[error("connection closed")]
    Closed,
    /// Socket IO failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// The WebSocket protocol layer failed.
    #[error("websocket error: {0}")]
    WebSocket(#[source] Box<tungstenite::Error>),
    /// A text frame was requested for bytes that are not UTF-8.
    #[error("text frame is not valid UTF-8: {0}")]
    InvalidText(#[from] FromUtf8Error),
    /// The transport's internal lock was poisoned by a panicking writer.
    #[error("transport lock poisoned")]
    Poisoned,
}

impl TransportError {
    /// Returns `true` when the error means the connection is gone for good.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl From<tungstenite::Error> for TransportError {
    fn from(error: tungstenite::Error) -> Self {
        match error {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::Closed
            }
            tungstenite::Error::Io(source) => Self::Io(source),
            other => Self::WebSocket(Box::new(other)),
        }
    }
}

/// Errors surfaced while upgrading an accepted stream to a WebSocket.
#[derive(Debug, Error)]
pub enum UpgradeError {
    /// The stream could not be configured before the handshake.
    #[error("failed to configure stream: {0}")]
    Configure(#[source] io::Error),
    /// The opening handshake failed or was rejected.
    #[error("websocket handshake failed: {message}")]
    Handshake {
        /// Handshake failure description.
        message: String,
    },
}

/// Errors surfaced while binding or running the socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The configured host could not be resolved.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Resolver error.
        #[source]
        source: io::Error,
    },
    /// The host resolved to no addresses.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },
    /// Binding the resolved address failed.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The socket could not be switched to non-blocking mode.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The accept thread could not be spawned.
    #[error("failed to spawn listener thread: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}
