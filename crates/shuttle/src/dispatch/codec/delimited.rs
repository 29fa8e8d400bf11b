//! Delimited codec: each frame is `type##payload` text.

use serde_json::Value;

use super::{CodecError, RequestDeserializer, ResponseSerializer};
use crate::dispatch::Message;

/// Separator between the message type and the payload.
pub const DELIMITER: &str = "##";

/// Codec for `type##payload` text frames.
///
/// Decoding splits on the first delimiter, so the payload may itself contain
/// `##`. The payload is carried as a JSON string. When encoding, string
/// payloads are written verbatim and any other payload as compact JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DelimitedCodec;

impl RequestDeserializer for DelimitedCodec {
    fn deserialize(&self, data: &[u8]) -> Result<Message, CodecError> {
        let text = std::str::from_utf8(data)?;
        let (message_type, payload) = text
            .split_once(DELIMITER)
            .ok_or(CodecError::MissingDelimiter)?;
        Ok(Message::new(message_type, Value::String(payload.to_owned())))
    }
}

impl ResponseSerializer for DelimitedCodec {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        if message.message_type.contains(DELIMITER) {
            return Err(CodecError::DelimiterInType {
                message_type: message.message_type.clone(),
            });
        }
        let payload = match &message.payload {
            Value::String(text) => text.clone(),
            Value::Null => String::new(),
            other => serde_json::to_string(other)?,
        };
        Ok(format!("{}{DELIMITER}{payload}", message.message_type).into_bytes())
    }
}
