//! Connection liveness and ownership of the conduits.
//!
//! Every producer sends through [`Lifecycle`] while holding the read side of
//! its lock, after checking that the engine is still running. Shutdown takes
//! the write side, flips the state and drops the senders, so no send can ever
//! reach a retired conduit.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::{DispatchError, Envelope};
use crate::transport::FrameKind;

/// Engine lifecycle states. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EngineState {
    /// Pipelines are accepting and emitting work.
    Running,
    /// The transport failed; outstanding work is being discarded.
    ShuttingDown,
    /// All long-lived pipelines have exited.
    Stopped,
}

/// An error awaiting the error writer, tagged with its request's frame kind.
#[derive(Debug)]
pub(crate) struct Failure {
    pub(crate) kind: FrameKind,
    pub(crate) error: DispatchError,
}

/// Outcome of a send attempt.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Sent,
    Discarded,
}

struct Conduits {
    requests: Sender<Envelope>,
    responses: Sender<Envelope>,
    errors: Sender<Failure>,
    // Never sent on; disconnects at retirement to wake blocked waiters.
    _closing: Sender<()>,
}

/// Receiving ends handed to the pipelines at startup.
pub(crate) struct Receivers {
    pub(crate) requests: Receiver<Envelope>,
    pub(crate) responses: Receiver<Envelope>,
    pub(crate) errors: Receiver<Failure>,
    pub(crate) closing: Receiver<()>,
}

struct Inner {
    state: EngineState,
    conduits: Option<Conduits>,
}

pub(crate) struct Lifecycle {
    inner: RwLock<Inner>,
}

impl Lifecycle {
    pub(crate) fn new() -> (Self, Receivers) {
        let (requests, requests_rx) = unbounded();
        let (responses, responses_rx) = unbounded();
        let (errors, errors_rx) = unbounded();
        let (closing, closing_rx) = unbounded();
        let lifecycle = Self {
            inner: RwLock::new(Inner {
                state: EngineState::Running,
                conduits: Some(Conduits {
                    requests,
                    responses,
                    errors,
                    _closing: closing,
                }),
            }),
        };
        let receivers = Receivers {
            requests: requests_rx,
            responses: responses_rx,
            errors: errors_rx,
            closing: closing_rx,
        };
        (lifecycle, receivers)
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> EngineState {
        self.read().state
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state() == EngineState::Running
    }

    pub(crate) fn send_request(&self, envelope: Envelope) -> Delivery {
        self.send_with(|conduits| conduits.requests.send(envelope).is_ok())
    }

    pub(crate) fn send_response(&self, envelope: Envelope) -> Delivery {
        self.send_with(|conduits| conduits.responses.send(envelope).is_ok())
    }

    pub(crate) fn send_error(&self, kind: FrameKind, error: DispatchError) -> Delivery {
        self.send_with(|conduits| conduits.errors.send(Failure { kind, error }).is_ok())
    }

    fn send_with(&self, send: impl FnOnce(&Conduits) -> bool) -> Delivery {
        let inner = self.read();
        let Some(conduits) = inner.conduits.as_ref() else {
            return Delivery::Discarded;
        };
        if inner.state == EngineState::Running && send(conduits) {
            Delivery::Sent
        } else {
            Delivery::Discarded
        }
    }

    /// Marks the engine as shutting down and retires every conduit.
    ///
    /// Returns `true` for the call that performed the transition.
    pub(crate) fn begin_shutdown(&self) -> bool {
        let mut inner = self.write();
        if inner.state != EngineState::Running {
            return false;
        }
        inner.state = EngineState::ShuttingDown;
        inner.conduits = None;
        true
    }

    pub(crate) fn mark_stopped(&self) {
        let mut inner = self.write();
        inner.state = EngineState::Stopped;
        inner.conduits = None;
    }
}
