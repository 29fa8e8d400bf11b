//! Connection handling abstractions for the socket listener.

use std::net::TcpStream;

/// Handles accepted socket connections.
///
/// The listener calls [`ConnectionHandler::handle`] on a dedicated thread per
/// connection, so implementations may block for the lifetime of the stream.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection. Implementations should avoid panicking.
    fn handle(&self, stream: TcpStream);
}

impl<F> ConnectionHandler for F
where
    F: Fn(TcpStream) + Send + Sync + 'static,
{
    fn handle(&self, stream: TcpStream) {
        self(stream);
    }
}
