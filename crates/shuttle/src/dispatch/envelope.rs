//! Decoded units exchanged between ingest, handlers and writers.

use serde_json::Value;

use crate::transport::FrameKind;

/// Application-level message: a type tag selecting a handler plus an opaque,
/// codec-defined payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Handler selector on requests; reply tag on responses and errors.
    pub message_type: String,
    /// Payload the engine never inspects.
    pub payload: Value,
}

impl Message {
    /// Creates a message.
    #[must_use]
    pub fn new(message_type: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            message_type: message_type.into(),
            payload: payload.into(),
        }
    }

    /// Returns the message type exactly as decoded. Lookups never normalise
    /// it, so `" request1 "` and `"request1"` are different types.
    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.message_type
    }
}

/// A message paired with the kind of frame it arrived in.
///
/// Handlers receive an envelope; the engine writes the handler's reply using
/// the same frame kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Frame kind the request arrived in.
    pub kind: FrameKind,
    /// Decoded request.
    pub message: Message,
}

impl Envelope {
    /// Creates an envelope.
    #[must_use]
    pub const fn new(kind: FrameKind, message: Message) -> Self {
        Self { kind, message }
    }

    /// Returns the request's message type.
    #[must_use]
    pub fn message_type(&self) -> &str {
        self.message.message_type()
    }

    /// Returns the request payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.message.payload
    }

    /// Returns the payload as text when it is a JSON string.
    #[must_use]
    pub fn payload_str(&self) -> Option<&str> {
        self.message.payload.as_str()
    }
}
