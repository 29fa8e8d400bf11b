//! Test harness utilities for the behavioural suites.

mod client;

pub use client::EchoClient;
