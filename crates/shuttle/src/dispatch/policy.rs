//! Mapping from dispatch failures to the message sent to the peer.

use super::{DispatchError, Message};

/// Message type used by [`DefaultErrorPolicy`].
pub const ERROR_MESSAGE_TYPE: &str = "error";

/// Converts a dispatch failure into the reply written to the peer.
pub trait ErrorPolicy: Send + Sync + 'static {
    /// Builds the error reply for `error`.
    fn to_message(&self, error: &DispatchError) -> Message;
}

impl<F> ErrorPolicy for F
where
    F: Fn(&DispatchError) -> Message + Send + Sync + 'static,
{
    fn to_message(&self, error: &DispatchError) -> Message {
        self(error)
    }
}

/// Replies with type `error` and the failure's display text as payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorPolicy;

impl ErrorPolicy for DefaultErrorPolicy {
    fn to_message(&self, error: &DispatchError) -> Message {
        Message::new(ERROR_MESSAGE_TYPE, error.to_string())
    }
}
