//! Registration API for a single connection.

use std::sync::Arc;

use tracing::warn;

use super::codec::{RequestDeserializer, ResponseSerializer};
use super::engine::{ConnectionSummary, Engine, EngineParts};
use super::{
    DISPATCH_TARGET, DefaultErrorPolicy, DispatchLimits, Envelope, ErrorPolicy, HandlerError,
    HandlerRegistry, HandlerRegistryBuilder, Message, MessageHandler, StartupError,
};
use crate::transport::FrameTransport;

/// A transport awaiting its codecs and handlers.
///
/// ```text
/// Connection::new(transport)
///     .codec(JsonCodec)
///     .handle("request1", |request: &Envelope| {
///         Ok(Message::new("response1", request.payload().clone()))
///     })
///     .listen()?;
/// ```
pub struct Connection<T> {
    transport: T,
    deserializer: Option<Arc<dyn RequestDeserializer>>,
    serializer: Option<Arc<dyn ResponseSerializer>>,
    handlers: HandlerRegistryBuilder,
    policy: Arc<dyn ErrorPolicy>,
    limits: DispatchLimits,
}

impl<T> Connection<T>
where
    T: FrameTransport,
{
    /// Wraps `transport` with no codecs, no handlers, the default error
    /// policy and no dispatch limits.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            deserializer: None,
            serializer: None,
            handlers: HandlerRegistry::builder(),
            policy: Arc::new(DefaultErrorPolicy),
            limits: DispatchLimits::default(),
        }
    }

    /// Sets the request deserializer.
    #[must_use]
    pub fn request_deserializer(mut self, deserializer: impl RequestDeserializer) -> Self {
        self.deserializer = Some(Arc::new(deserializer));
        self
    }

    /// Sets the response serializer.
    #[must_use]
    pub fn response_serializer(mut self, serializer: impl ResponseSerializer) -> Self {
        self.serializer = Some(Arc::new(serializer));
        self
    }

    /// Uses `codec` in both directions.
    #[must_use]
    pub fn codec<C>(self, codec: C) -> Self
    where
        C: RequestDeserializer + ResponseSerializer + Clone,
    {
        self.request_deserializer(codec.clone())
            .response_serializer(codec)
    }

    /// Registers a closure for `message_type`.
    #[must_use]
    pub fn handle<F>(self, message_type: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Envelope) -> Result<Message, HandlerError> + Send + Sync + 'static,
    {
        self.handler(message_type, handler)
    }

    /// Registers a [`MessageHandler`] implementation for `message_type`.
    #[must_use]
    pub fn handler(
        mut self,
        message_type: impl Into<String>,
        handler: impl MessageHandler,
    ) -> Self {
        self.handlers.register(message_type, Arc::new(handler));
        self
    }

    /// Replaces the error policy.
    #[must_use]
    pub fn error_policy(mut self, policy: impl ErrorPolicy) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Sets dispatch limits.
    #[must_use]
    pub fn limits(mut self, limits: DispatchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Serves the connection until the transport fails or the peer leaves.
    ///
    /// Blocks the calling thread, which runs the dispatch loop. Handler
    /// tasks still running when this returns keep running; their outcomes
    /// are discarded.
    ///
    /// # Errors
    ///
    /// Returns a [`StartupError`] when no request deserializer, no response
    /// serializer or no handler is registered, or a pipeline thread cannot
    /// be spawned. The transport is closed in every case.
    pub fn listen(self) -> Result<ConnectionSummary, StartupError> {
        let parts = match self.into_parts() {
            Ok(parts) => parts,
            Err((transport, error)) => {
                warn!(target: DISPATCH_TARGET, %error, "connection cannot start");
                if let Err(close_error) = transport.close() {
                    warn!(
                        target: DISPATCH_TARGET,
                        error = %close_error,
                        "failed to close transport"
                    );
                }
                return Err(error);
            }
        };
        Engine::run(parts)
    }

    fn into_parts(self) -> Result<EngineParts<T>, (T, StartupError)> {
        let Some(deserializer) = self.deserializer else {
            return Err((self.transport, StartupError::MissingDeserializer));
        };
        let Some(serializer) = self.serializer else {
            return Err((self.transport, StartupError::MissingSerializer));
        };
        if self.handlers.is_empty() {
            return Err((self.transport, StartupError::NoHandlers));
        }
        Ok(EngineParts {
            transport: self.transport,
            deserializer,
            serializer,
            registry: self.handlers.build(),
            policy: self.policy,
            limits: self.limits,
        })
    }
}
