//! lorabridge-test-harness: Test utilities and mock transports for the
//! gateway.
//!
//! This crate provides [`MockTransport`] for deterministic testing of the AT
//! protocol engine, the radio IO task, and the bridge logic without a real
//! LoRa module attached.

pub mod mock_serial;

pub use mock_serial::{InboundQueue, MockTransport, SentLog};
