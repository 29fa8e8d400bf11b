//! Blocking WebSocket client used to drive a running server.

use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use tungstenite::{Message, WebSocket};

const READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Client connected to a server endpoint.
pub struct EchoClient {
    socket: WebSocket<TcpStream>,
}

impl EchoClient {
    /// Connects to `path` on `addr` and completes the opening handshake.
    pub fn connect(addr: SocketAddr, path: &str) -> Result<Self, String> {
        let stream = TcpStream::connect(addr).map_err(|error| error.to_string())?;
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(|error| error.to_string())?;
        let (socket, _) = tungstenite::client(format!("ws://{addr}{path}"), stream)
            .map_err(|error| error.to_string())?;
        Ok(Self { socket })
    }

    /// Sends one text frame.
    pub fn send_text(&mut self, text: &str) {
        self.socket
            .send(Message::Text(text.to_owned()))
            .expect("send text frame");
    }

    /// Waits for the next text frame.
    pub fn recv_text(&mut self) -> String {
        loop {
            match self.socket.read().expect("read frame") {
                Message::Text(text) => return text,
                Message::Binary(data) => return String::from_utf8_lossy(&data).into_owned(),
                Message::Close(frame) => panic!("server closed the connection: {frame:?}"),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    /// Starts the closing handshake.
    pub fn close(&mut self) {
        self.socket.close(None).ok();
        self.socket.flush().ok();
    }
}

impl Drop for EchoClient {
    fn drop(&mut self) {
        self.close();
    }
}
