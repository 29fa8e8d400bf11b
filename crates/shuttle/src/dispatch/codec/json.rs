//! JSON codec: each frame is one `{"type": .., "body": ..}` object.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CodecError, RequestDeserializer, ResponseSerializer};
use crate::dispatch::Message;

#[derive(Deserialize)]
struct InboundFrame {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    body: Value,
}

#[derive(Serialize)]
struct OutboundFrame<'a> {
    #[serde(rename = "type")]
    message_type: &'a str,
    body: &'a Value,
}

/// Codec for JSON objects carrying a `type` string and an arbitrary `body`.
///
/// A missing `body` decodes as `null`. A missing `type` is a decode error.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl RequestDeserializer for JsonCodec {
    fn deserialize(&self, data: &[u8]) -> Result<Message, CodecError> {
        let frame: InboundFrame = serde_json::from_slice(data)?;
        Ok(Message::new(frame.message_type, frame.body))
    }
}

impl ResponseSerializer for JsonCodec {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        let frame = OutboundFrame {
            message_type: &message.message_type,
            body: &message.payload,
        };
        Ok(serde_json::to_vec(&frame)?)
    }
}
