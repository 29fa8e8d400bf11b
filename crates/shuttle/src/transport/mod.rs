//! Framed transports and the socket listener that feeds them.
//!
//! The dispatch engine only sees the [`FrameTransport`] trait. The listener
//! accepts TCP connections on a background thread and hands each one to a
//! [`ConnectionHandler`]; [`WebSocketUpgrade`] is the handler that performs
//! the WebSocket handshake and runs a dispatch engine on the result.

mod errors;
mod frame;
mod handler;
mod listener;
#[cfg(test)]
pub(crate) mod memory;
mod websocket;

pub use self::errors::{ListenerError, TransportError, UpgradeError};
#[cfg(test)]
pub(crate) use self::frame::MockFrameTransport;
pub use self::frame::{Frame, FrameKind, FrameTransport};
pub use self::handler::ConnectionHandler;
pub use self::listener::{ListenerHandle, SocketListener};
pub use self::websocket::{WebSocketTransport, WebSocketUpgrade};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
