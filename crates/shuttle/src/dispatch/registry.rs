//! Message handlers and the registry that routes requests to them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{DISPATCH_TARGET, Envelope, HandlerError, Message};

/// Application logic invoked for one request type.
///
/// Handlers run on their own thread, possibly many at once, so they must be
/// shareable. The returned [`Message`] is written back using the request's
/// frame kind; an error becomes an error envelope instead.
pub trait MessageHandler: Send + Sync + 'static {
    /// Handles one request.
    ///
    /// # Errors
    ///
    /// Any error is reported to the peer through the connection's error
    /// policy.
    fn handle(&self, request: &Envelope) -> Result<Message, HandlerError>;
}

impl<F> MessageHandler for F
where
    F: Fn(&Envelope) -> Result<Message, HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, request: &Envelope) -> Result<Message, HandlerError> {
        self(request)
    }
}

/// Immutable mapping from message type to handler.
///
/// Built once per connection and shared read-only by every handler task.
/// Types match byte for byte.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerRegistry {
    /// Starts an empty registry builder.
    #[must_use]
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// Looks up the handler registered for `message_type`.
    #[must_use]
    pub fn get(&self, message_type: &str) -> Option<&Arc<dyn MessageHandler>> {
        self.handlers.get(message_type)
    }

    /// Returns `true` when a handler is registered for `message_type`.
    #[must_use]
    pub fn contains(&self, message_type: &str) -> bool {
        self.handlers.contains_key(message_type)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` when no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered message types in sorted order.
    #[must_use]
    pub fn message_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HandlerRegistry")
            .field("message_types", &self.message_types())
            .finish()
    }
}

/// Mutable registration phase of a [`HandlerRegistry`].
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerRegistryBuilder {
    /// Registers `handler` for `message_type`, replacing any earlier handler
    /// for the same type.
    pub fn register(&mut self, message_type: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let key = message_type.into();
        if self.handlers.insert(key.clone(), handler).is_some() {
            debug!(
                target: DISPATCH_TARGET,
                message_type = %key,
                "replaced previously registered handler"
            );
        }
    }

    /// Registers `handler` for `message_type` and returns the builder.
    #[must_use]
    pub fn with<H>(mut self, message_type: impl Into<String>, handler: H) -> Self
    where
        H: MessageHandler,
    {
        self.register(message_type, Arc::new(handler));
        self
    }

    /// Returns `true` when nothing has been registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Freezes the registrations.
    #[must_use]
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::transport::FrameKind;

    fn reply(tag: &'static str) -> impl Fn(&Envelope) -> Result<Message, HandlerError> {
        move |_request: &Envelope| Ok(Message::new(tag, serde_json::Value::Null))
    }

    #[rstest]
    #[case::exact("request1", true)]
    #[case::leading_space(" request1", false)]
    #[case::padded(" request1 ", false)]
    #[case::different_case("Request1", false)]
    #[case::other("request2", false)]
    fn routes_by_exact_type(#[case] lookup: &str, #[case] found: bool) {
        let registry = HandlerRegistry::builder()
            .with("request1", reply("response1"))
            .build();
        assert_eq!(registry.contains(lookup), found);
    }

    #[rstest]
    fn padded_registration_keeps_its_padding() {
        let registry = HandlerRegistry::builder()
            .with(" request1 ", reply("response1"))
            .build();
        assert!(registry.contains(" request1 "));
        assert!(!registry.contains("request1"));
    }

    #[rstest]
    fn later_registration_replaces_earlier() {
        let registry = HandlerRegistry::builder()
            .with("request1", reply("first"))
            .with("request1", reply("second"))
            .build();
        let request = Envelope::new(FrameKind::Text, Message::new("request1", "x"));
        let handler = registry.get("request1").expect("registered");
        let message = handler.handle(&request).expect("handler succeeds");
        assert_eq!(message.message_type, "second");
        assert_eq!(registry.len(), 1);
    }

    #[rstest]
    fn lists_types_in_order() {
        let registry = HandlerRegistry::builder()
            .with("b", reply("b"))
            .with("a", reply("a"))
            .build();
        assert_eq!(registry.message_types(), vec!["a", "b"]);
    }
}
