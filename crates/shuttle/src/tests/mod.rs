//! Behavioural test suites for the dispatch server.

mod dispatch_behaviour;
mod listener_behaviour;
mod support;
