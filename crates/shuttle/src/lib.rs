//! Request/response dispatch over WebSocket connections.
//!
//! A server registers typed message handlers on each accepted connection.
//! Every inbound frame is decoded into a [`dispatch::Message`] whose type
//! selects the handler; handler replies are serialised back to the peer as
//! they complete, independently of request order. Failures that do not end
//! the connection are answered with an error reply built by the connection's
//! [`dispatch::ErrorPolicy`].
//!
//! The crate is organised in layers:
//!
//! - [`transport`]: the [`transport::FrameTransport`] contract, the TCP
//!   socket listener and the `tungstenite` WebSocket adapter;
//! - [`dispatch`]: codecs, the handler registry and the per-connection
//!   dispatch engine;
//! - [`server`]: launch sequencing for the `shuttle-echo` binary, which
//!   serves the handlers in [`demo`].
//!
//! Concurrency uses OS threads throughout. Each connection runs an ingest
//! thread, two writer threads and one thread per in-flight request; the
//! caller of [`dispatch::Connection::listen`] runs the dispatch loop.

pub mod demo;
pub mod dispatch;
pub mod server;
mod telemetry;
pub mod transport;

pub use server::{ServeError, run_server};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};

#[cfg(test)]
mod tests;
