//! Transport trait for radio module communication.
//!
//! The [`Transport`] trait abstracts over the physical link to the LoRa
//! module. The real implementation is a serial port (`lorabridge-transport`);
//! tests use `MockTransport` from `lorabridge-test-harness`.
//!
//! The AT protocol engine in `lorabridge-rak` operates on a `Transport`
//! rather than directly on a serial port, so line assembly, response
//! matching, and frame scanning can be tested without hardware.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a radio module.
///
/// Implementations handle buffering and error recovery at the physical
/// layer. Line framing and AT command semantics are handled by the protocol
/// engine that consumes this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the module.
    ///
    /// Implementations should block until all bytes have been written to
    /// the underlying transport.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the module into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Will wait up to `timeout`
    /// for data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if no data is received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After calling `close()`, subsequent `send()` and `receive()` calls
    /// should return [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
