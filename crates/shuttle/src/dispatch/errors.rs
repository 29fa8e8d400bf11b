//! Error types for request dispatch failures.
//!
//! [`DispatchError`] covers every failure that is answered with an error
//! envelope while the connection stays open. [`StartupError`] covers the
//! preconditions checked before any pipeline starts.

use std::io;
use std::time::Duration;

use thiserror::Error;

use super::codec::CodecError;

/// Error type returned by message handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Recoverable failures converted into error envelopes for the peer.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The frame could not be deserialised into a request.
    #[error("malformed request: {source}")]
    Decode {
        /// Codec failure.
        #[source]
        source: CodecError,
    },

    /// The request decoded but carries no message type.
    #[error("request is missing a message type")]
    MissingType,

    /// No handler is registered for the request's type.
    #[error("no handler registered for type {message_type}")]
    UnknownType {
        /// Type carried by the request.
        message_type: String,
    },

    /// The handler returned an error.
    #[error("{source}")]
    Handler {
        /// Type the handler was registered for.
        message_type: String,
        /// Error returned by the handler.
        #[source]
        source: HandlerError,
    },

    /// The handler panicked.
    #[error("handler for type {message_type} panicked")]
    HandlerPanicked {
        /// Type the handler was registered for.
        message_type: String,
    },

    /// The handler did not return within the configured deadline.
    #[error("handler for type {message_type} did not finish within {deadline:?}")]
    HandlerTimeout {
        /// Type the handler was registered for.
        message_type: String,
        /// Deadline that elapsed.
        deadline: Duration,
    },

    /// The handler's reply could not be serialised.
    #[error("failed to serialize response of type {message_type}: {source}")]
    Encode {
        /// Type of the reply.
        message_type: String,
        /// Codec failure.
        #[source]
        source: CodecError,
    },
}

impl DispatchError {
    /// Creates a decode error.
    #[must_use]
    pub const fn decode(source: CodecError) -> Self {
        Self::Decode { source }
    }

    /// Creates an unknown type error.
    #[must_use]
    pub fn unknown_type(message_type: impl Into<String>) -> Self {
        Self::UnknownType {
            message_type: message_type.into(),
        }
    }

    /// Creates a handler error.
    #[must_use]
    pub fn handler(message_type: impl Into<String>, source: HandlerError) -> Self {
        Self::Handler {
            message_type: message_type.into(),
            source,
        }
    }

    /// Creates a handler panic error.
    #[must_use]
    pub fn handler_panicked(message_type: impl Into<String>) -> Self {
        Self::HandlerPanicked {
            message_type: message_type.into(),
        }
    }

    /// Creates a handler timeout error.
    #[must_use]
    pub fn handler_timeout(message_type: impl Into<String>, deadline: Duration) -> Self {
        Self::HandlerTimeout {
            message_type: message_type.into(),
            deadline,
        }
    }

    /// Creates a response encoding error.
    #[must_use]
    pub fn encode(message_type: impl Into<String>, source: CodecError) -> Self {
        Self::Encode {
            message_type: message_type.into(),
            source,
        }
    }

    /// Returns the request type the error relates to, when one is known.
    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        match self {
            Self::Decode { .. } | Self::MissingType => None,
            Self::UnknownType { message_type }
            | Self::Handler { message_type, .. }
            | Self::HandlerPanicked { message_type }
            | Self::HandlerTimeout { message_type, .. }
            | Self::Encode { message_type, .. } => Some(message_type),
        }
    }
}

/// Preconditions that stop a connection from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    /// No request deserializer was registered.
    #[error("a request deserializer must be registered on the connection")]
    MissingDeserializer,

    /// No response serializer was registered.
    #[error("a response serializer must be registered on the connection")]
    MissingSerializer,

    /// No message handlers were registered.
    #[error("no message handlers have been registered for the connection")]
    NoHandlers,

    /// A pipeline thread could not be spawned.
    #[error("failed to spawn {pipeline} pipeline: {source}")]
    Spawn {
        /// Pipeline name.
        pipeline: &'static str,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}
