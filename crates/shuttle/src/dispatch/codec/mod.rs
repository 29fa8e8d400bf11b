//! Pluggable request and response codecs.
//!
//! A connection needs one [`RequestDeserializer`] and one
//! [`ResponseSerializer`]. Both are pure functions of their input; closures
//! with the matching signature implement the traits directly.

mod delimited;
mod json;

use std::str::Utf8Error;

use thiserror::Error;

use super::Message;

pub use self::delimited::{DELIMITER, DelimitedCodec};
pub use self::json::JsonCodec;

/// Failures raised while decoding requests or encoding replies.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The bytes were not valid JSON for the expected shape.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A delimited frame did not contain the type delimiter.
    #[error("frame does not contain the '##' delimiter")]
    MissingDelimiter,

    /// The frame was not valid UTF-8.
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] Utf8Error),

    /// The message type contains the delimiter and cannot be framed.
    #[error("message type '{message_type}' contains the '##' delimiter")]
    DelimiterInType {
        /// Offending message type.
        message_type: String,
    },

    /// Failure reported by an application-supplied codec.
    #[error("{0}")]
    Custom(String),
}

impl CodecError {
    /// Creates a codec error from free-form text.
    #[must_use]
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// Decodes one inbound frame into a [`Message`].
pub trait RequestDeserializer: Send + Sync + 'static {
    /// Decodes `data`.
    ///
    /// # Errors
    ///
    /// Returns an error when the bytes do not form a request.
    fn deserialize(&self, data: &[u8]) -> Result<Message, CodecError>;
}

/// Encodes a reply [`Message`] into frame bytes.
pub trait ResponseSerializer: Send + Sync + 'static {
    /// Encodes `message`.
    ///
    /// # Errors
    ///
    /// Returns an error when the message cannot be represented on the wire.
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, CodecError>;
}

impl<F> RequestDeserializer for F
where
    F: Fn(&[u8]) -> Result<Message, CodecError> + Send + Sync + 'static,
{
    fn deserialize(&self, data: &[u8]) -> Result<Message, CodecError> {
        self(data)
    }
}

impl<F> ResponseSerializer for F
where
    F: Fn(&Message) -> Result<Vec<u8>, CodecError> + Send + Sync + 'static,
{
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        self(message)
    }
}
