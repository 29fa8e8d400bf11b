//! WebSocket transport built on `tungstenite`.
//!
//! A single [`WebSocket`] is shared between the ingest thread and the writer
//! threads behind a mutex. Reads poll the socket with a short timeout and
//! release the lock between attempts, so writers are never starved by a peer
//! that is slow to send.

use std::io;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::{HandshakeError, Message, WebSocket};

use crate::dispatch::{Connection, ConnectionSummary, StartupError};

use super::{
    ConnectionHandler, Frame, FrameKind, FrameTransport, LISTENER_TARGET, TransportError,
    UpgradeError,
};

const READ_POLL: Duration = Duration::from_millis(25);
const READ_YIELD: Duration = Duration::from_millis(1);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// [`FrameTransport`] over an upgraded WebSocket stream.
#[derive(Debug)]
pub struct WebSocketTransport {
    socket: Mutex<WebSocket<TcpStream>>,
    closed: AtomicBool,
}

impl WebSocketTransport {
    /// Performs the server side of the opening handshake on `stream`.
    ///
    /// Requests for any path other than `path` are answered with `404 Not
    /// Found` and the handshake fails.
    ///
    /// # Errors
    ///
    /// Returns an error when the stream cannot be configured or the handshake
    /// fails, times out, or is rejected.
    pub fn accept(stream: TcpStream, path: &str) -> Result<Self, UpgradeError> {
        stream
            .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
            .map_err(UpgradeError::Configure)?;
        let socket = tungstenite::accept_hdr(stream, |request: &Request, response: Response| {
            check_path(request, response, path)
        })
        .map_err(|error| match error {
            HandshakeError::Interrupted(_) => UpgradeError::Handshake {
                message: "handshake timed out".to_owned(),
            },
            HandshakeError::Failure(failure) => UpgradeError::Handshake {
                message: failure.to_string(),
            },
        })?;
        Self::from_socket(socket)
    }

    /// Wraps an already upgraded socket.
    ///
    /// # Errors
    ///
    /// Returns an error when the read poll timeout cannot be applied.
    pub fn from_socket(socket: WebSocket<TcpStream>) -> Result<Self, UpgradeError> {
        socket
            .get_ref()
            .set_read_timeout(Some(READ_POLL))
            .map_err(UpgradeError::Configure)?;
        Ok(Self {
            socket: Mutex::new(socket),
            closed: AtomicBool::new(false),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, WebSocket<TcpStream>>, TransportError> {
        self.socket.lock().map_err(|_| TransportError::Poisoned)
    }
}

fn check_path(
    request: &Request,
    response: Response,
    expected: &str,
) -> Result<Response, ErrorResponse> {
    if request.uri().path() == expected {
        return Ok(response);
    }
    warn!(
        target: LISTENER_TARGET,
        path = request.uri().path(),
        expected,
        "rejecting upgrade for unknown path"
    );
    let body = format!("no endpoint at {}", request.uri().path());
    let mut rejection = ErrorResponse::new(Some(body));
    *rejection.status_mut() = StatusCode::NOT_FOUND;
    Err(rejection)
}

fn is_poll_timeout(error: &tungstenite::Error) -> bool {
    matches!(
        error,
        tungstenite::Error::Io(source)
            if matches!(source.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
    )
}

impl FrameTransport for WebSocketTransport {
    fn read_frame(&self) -> Result<Frame, TransportError> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed);
            }
            let result = self.lock()?.read();
            match result {
                Ok(Message::Text(text)) => return Ok(Frame::text(text)),
                Ok(Message::Binary(data)) => return Ok(Frame::binary(data)),
                Ok(Message::Close(frame)) => {
                    debug!(target: LISTENER_TARGET, ?frame, "peer sent close frame");
                    return Err(TransportError::Closed);
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(error) if is_poll_timeout(&error) => thread::sleep(READ_YIELD),
                Err(error) => return Err(error.into()),
            }
        }
    }

    fn write_frame(&self, kind: FrameKind, data: &[u8]) -> Result<(), TransportError> {
        let message = match kind {
            FrameKind::Text => Message::Text(String::from_utf8(data.to_vec())?),
            FrameKind::Binary => Message::Binary(data.to_vec()),
        };
        self.lock()?.send(message)?;
        Ok(())
    }

    fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut socket = self.lock()?;
        let outcome = socket.close(None).and_then(|()| socket.flush());
        match outcome {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(error) => Err(error.into()),
        }
    }
}

/// Connection handler that upgrades accepted streams and runs a dispatch
/// engine on each.
///
/// `setup` receives an unconfigured [`Connection`]; it registers codecs and
/// handlers and then calls [`Connection::listen`], which blocks until the
/// peer goes away.
pub struct WebSocketUpgrade<F> {
    path: String,
    setup: F,
}

impl<F> WebSocketUpgrade<F>
where
    F: Fn(Connection<WebSocketTransport>) -> Result<ConnectionSummary, StartupError>
        + Send
        + Sync
        + 'static,
{
    /// Creates an upgrade handler serving `path`.
    #[must_use]
    pub fn new(path: impl Into<String>, setup: F) -> Self {
        Self {
            path: path.into(),
            setup,
        }
    }
}

impl<F> ConnectionHandler for WebSocketUpgrade<F>
where
    F: Fn(Connection<WebSocketTransport>) -> Result<ConnectionSummary, StartupError>
        + Send
        + Sync
        + 'static,
{
    fn handle(&self, stream: TcpStream) {
        let peer = stream
            .peer_addr()
            .map_or_else(|_| "unknown".to_owned(), |addr| addr.to_string());
        let transport = match WebSocketTransport::accept(stream, &self.path) {
            Ok(transport) => transport,
            Err(error) => {
                warn!(target: LISTENER_TARGET, %peer, %error, "websocket connection setup failed");
                return;
            }
        };
        info!(target: LISTENER_TARGET, %peer, path = %self.path, "websocket connection opened");
        match (self.setup)(Connection::new(transport)) {
            Ok(summary) => info!(
                target: LISTENER_TARGET,
                %peer,
                requests = summary.requests,
                responses = summary.responses,
                errors = summary.errors,
                discarded = summary.discarded,
                "connection closed"
            ),
            Err(error) => warn!(
                target: LISTENER_TARGET,
                %peer,
                %error,
                "connection refused to start"
            ),
        }
    }
}
