//! Echo handlers served by `shuttle-echo`.
//!
//! Both codec variants register `request1` and `request2`. The handlers sleep
//! to simulate work of different lengths, so replies to a quick `request1`
//! overtake a `request2` sent before it.

use std::thread;
use std::time::Duration;

use serde::Deserialize;

use shuttle_config::CodecKind;

use crate::dispatch::{Connection, DelimitedCodec, Envelope, HandlerError, JsonCodec, Message};
use crate::transport::FrameTransport;

/// Simulated work per request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoTimings {
    /// Delay before answering `request1`.
    pub request1: Duration,
    /// Delay before answering `request2`.
    pub request2: Duration,
}

impl Default for DemoTimings {
    fn default() -> Self {
        Self {
            request1: Duration::from_secs(2),
            request2: Duration::from_secs(7),
        }
    }
}

impl DemoTimings {
    /// Timings with no simulated work.
    #[must_use]
    pub const fn instant() -> Self {
        Self {
            request1: Duration::ZERO,
            request2: Duration::ZERO,
        }
    }
}

#[derive(Deserialize)]
struct EchoRequest {
    message: String,
}

/// Registers `codec` and the echo handlers on `connection`.
#[must_use]
pub fn register<T>(
    connection: Connection<T>,
    codec: CodecKind,
    timings: DemoTimings,
) -> Connection<T>
where
    T: FrameTransport,
{
    match codec {
        CodecKind::Delimited => connection
            .codec(DelimitedCodec)
            .handle("request1", move |request| {
                thread::sleep(timings.request1);
                Ok(Message::new("response1", echo_text(request)))
            })
            .handle("request2", move |request| {
                thread::sleep(timings.request2);
                Ok(Message::new("response2", echo_text(request)))
            }),
        CodecKind::Json => connection
            .codec(JsonCodec)
            .handle("request1", move |request| {
                thread::sleep(timings.request1);
                extract_message(request)
            })
            .handle("request2", move |request| {
                thread::sleep(timings.request2);
                Ok(Message::new("response2", request.payload().clone()))
            }),
    }
}

fn echo_text(request: &Envelope) -> String {
    request.payload_str().map_or_else(
        || format!("echo: {}", request.payload()),
        |text| format!("echo: {text}"),
    )
}

fn extract_message(request: &Envelope) -> Result<Message, HandlerError> {
    let body = EchoRequest::deserialize(request.payload())?;
    Ok(Message::new("response1", body.message))
}
