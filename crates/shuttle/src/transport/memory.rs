//! In-memory transport used to drive the dispatch engine in tests.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use super::{Frame, FrameKind, FrameTransport, TransportError};

/// Server side of an in-memory connection.
pub(crate) struct MemoryTransport {
    inbound: Receiver<Result<Frame, TransportError>>,
    outbound: Sender<(FrameKind, Vec<u8>)>,
    closed: AtomicBool,
    close_calls: Arc<AtomicUsize>,
}

/// Client side of an in-memory connection.
pub(crate) struct MemoryPeer {
    to_server: Sender<Result<Frame, TransportError>>,
    from_server: Receiver<(FrameKind, Vec<u8>)>,
    close_calls: Arc<AtomicUsize>,
}

/// Creates a connected transport/peer pair.
pub(crate) fn pair() -> (MemoryTransport, MemoryPeer) {
    let (to_server, inbound) = unbounded();
    let (outbound, from_server) = unbounded();
    let close_calls = Arc::new(AtomicUsize::new(0));
    let transport = MemoryTransport {
        inbound,
        outbound,
        closed: AtomicBool::new(false),
        close_calls: Arc::clone(&close_calls),
    };
    let peer = MemoryPeer {
        to_server,
        from_server,
        close_calls,
    };
    (transport, peer)
}

impl FrameTransport for MemoryTransport {
    fn read_frame(&self) -> Result<Frame, TransportError> {
        match self.inbound.recv() {
            Ok(frame) => frame,
            Err(_) => Err(TransportError::Closed),
        }
    }

    fn write_frame(&self, kind: FrameKind, data: &[u8]) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send((kind, data.to_vec()))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl MemoryPeer {
    pub(crate) fn send_text(&self, text: &str) {
        self.send_frame(Frame::text(text));
    }

    pub(crate) fn send_frame(&self, frame: Frame) {
        self.to_server.send(Ok(frame)).expect("server side dropped");
    }

    /// Makes the server's next read fail, as a dropped socket would.
    pub(crate) fn fail_read(&self) {
        let error = io::Error::new(io::ErrorKind::ConnectionReset, "peer reset");
        self.to_server
            .send(Err(TransportError::Io(error)))
            .expect("server side dropped");
    }

    /// Ends the connection as an orderly close by the peer would.
    pub(crate) fn hang_up(&self) {
        self.to_server.send(Err(TransportError::Closed)).ok();
    }

    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Option<(FrameKind, String)> {
        match self.from_server.recv_timeout(timeout) {
            Ok((kind, data)) => Some((kind, String::from_utf8_lossy(&data).into_owned())),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub(crate) fn recv_text(&self, timeout: Duration) -> String {
        match self.recv_timeout(timeout) {
            Some((_, text)) => text,
            None => panic!("no frame written within {timeout:?}"),
        }
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}
