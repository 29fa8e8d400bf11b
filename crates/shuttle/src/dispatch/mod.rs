//! Request/response dispatch over a framed transport.
//!
//! A [`Connection`] wraps a [`FrameTransport`](crate::transport::FrameTransport)
//! and routes every decoded request to the handler registered for its type.
//! Handlers run concurrently, one thread per request, and their replies are
//! written back as they complete rather than in request order. Failures that
//! do not end the connection are reported to the peer through the
//! [`ErrorPolicy`]; only a failed transport read ends it.
//!
//! Each request yields at most one outbound frame, written with the frame
//! kind the request arrived in.

pub mod codec;
mod connection;
mod engine;
mod envelope;
mod errors;
mod lifecycle;
mod limits;
mod policy;
mod registry;

pub use self::codec::{
    CodecError, DELIMITER, DelimitedCodec, JsonCodec, RequestDeserializer, ResponseSerializer,
};
pub use self::connection::Connection;
pub use self::engine::{ConnectionSummary, INTERNAL_ERROR_PAYLOAD};
pub use self::envelope::{Envelope, Message};
pub use self::errors::{DispatchError, HandlerError, StartupError};
pub use self::limits::DispatchLimits;
pub use self::policy::{DefaultErrorPolicy, ERROR_MESSAGE_TYPE, ErrorPolicy};
pub use self::registry::{HandlerRegistry, HandlerRegistryBuilder, MessageHandler};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
