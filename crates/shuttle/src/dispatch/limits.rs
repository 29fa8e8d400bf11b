//! Optional bounds on handler concurrency and duration.

use std::num::NonZeroUsize;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select};

/// Per-connection dispatch bounds. Both are off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchLimits {
    /// Maximum number of handler tasks running at once.
    pub max_in_flight: Option<NonZeroUsize>,
    /// Time after which a handler's result is no longer awaited.
    pub handler_deadline: Option<Duration>,
}

impl DispatchLimits {
    /// No admission limit and no deadline.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_in_flight: None,
            handler_deadline: None,
        }
    }

    /// Sets the admission limit.
    #[must_use]
    pub const fn with_max_in_flight(mut self, max_in_flight: NonZeroUsize) -> Self {
        self.max_in_flight = Some(max_in_flight);
        self
    }

    /// Sets the handler deadline.
    #[must_use]
    pub const fn with_handler_deadline(mut self, deadline: Duration) -> Self {
        self.handler_deadline = Some(deadline);
        self
    }
}

/// Counting gate built on a bounded channel: a slot is taken by sending and
/// given back by receiving.
pub(crate) struct Admission {
    slots: Option<(Sender<()>, Receiver<()>)>,
}

impl Admission {
    pub(crate) fn new(max_in_flight: Option<NonZeroUsize>) -> Self {
        Self {
            slots: max_in_flight.map(|max| bounded(max.get())),
        }
    }

    /// Waits for a free slot. Returns `None` when `closing` disconnects first.
    pub(crate) fn acquire(&self, closing: &Receiver<()>) -> Option<Permit> {
        let Some((taken, released)) = &self.slots else {
            return Some(Permit { slot: None });
        };
        select! {
            send(taken, ()) -> sent => sent.ok().map(|()| Permit {
                slot: Some(released.clone()),
            }),
            recv(closing) -> _ => None,
        }
    }
}

/// Held by a handler task for its lifetime.
pub(crate) struct Permit {
    slot: Option<Receiver<()>>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(slot) = &self.slot {
            slot.try_recv().ok();
        }
    }
}
