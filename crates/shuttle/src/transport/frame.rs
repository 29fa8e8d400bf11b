//! Frame-level contract between the dispatch engine and a transport.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::TransportError;

/// Transport-level discriminator for a frame.
///
/// The engine never interprets the kind; it records it with each request and
/// writes the reply using the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// UTF-8 text frame.
    Text,
    /// Opaque binary frame.
    Binary,
}

impl FrameKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Binary => "binary",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A single frame read from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame discriminator.
    pub kind: FrameKind,
    /// Frame body.
    pub data: Vec<u8>,
}

impl Frame {
    /// Creates a text frame.
    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: FrameKind::Text,
            data: data.into(),
        }
    }

    /// Creates a binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: FrameKind::Binary,
            data: data.into(),
        }
    }
}

/// Bidirectional framed transport consumed by the dispatch engine.
///
/// `read_frame` is only ever called from the engine's ingest thread, while
/// `write_frame` is called from both writer threads under the engine's write
/// gate. Implementations must tolerate a read and a write in flight at the
/// same time, and `close` must be idempotent.
#[cfg_attr(test, mockall::automock)]
pub trait FrameTransport: Send + Sync + 'static {
    /// Blocks until a frame arrives or the transport fails.
    ///
    /// # Errors
    ///
    /// Any error, including an orderly close by the peer, ends the connection.
    fn read_frame(&self) -> Result<Frame, TransportError>;

    /// Writes one frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the frame cannot be written.
    fn write_frame(&self, kind: FrameKind, data: &[u8]) -> Result<(), TransportError>;

    /// Closes the transport. Calling it more than once is harmless.
    ///
    /// # Errors
    ///
    /// Returns an error when the close handshake cannot be sent.
    fn close(&self) -> Result<(), TransportError>;
}

impl<T> FrameTransport for Arc<T>
where
    T: FrameTransport,
{
    fn read_frame(&self) -> Result<Frame, TransportError> {
        (**self).read_frame()
    }

    fn write_frame(&self, kind: FrameKind, data: &[u8]) -> Result<(), TransportError> {
        (**self).write_frame(kind, data)
    }

    fn close(&self) -> Result<(), TransportError> {
        (**self).close()
    }
}
