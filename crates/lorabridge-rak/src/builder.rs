//! RakBuilder -- fluent builder for constructing [`RakRadio`] instances.
//!
//! Separates configuration from construction so callers can set the serial
//! port and protocol timing before the port is opened and the IO task is
//! spawned.
//!
//! # Example
//!
//! ```no_run
//! use lorabridge_rak::RakBuilder;
//! use lorabridge_core::RadioConfig;
//!
//! # async fn example() -> lorabridge_core::Result<()> {
//! let radio = RakBuilder::new()
//!     .serial_port("/dev/ttyUSB0")
//!     .baud_rate(115_200)
//!     .build()
//!     .await?;
//! radio.bring_up(&RadioConfig::default()).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use tracing::debug;

use lorabridge_core::error::{Error, Result};
use lorabridge_core::transport::Transport;

use crate::radio::RakRadio;
use crate::timing::Timing;

/// Baud rate of the RAK4270 AT interface out of the box.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Fluent builder for [`RakRadio`].
pub struct RakBuilder {
    serial_port: Option<String>,
    baud_rate: u32,
    timing: Timing,
    event_capacity: usize,
    discard_startup_output: bool,
}

impl RakBuilder {
    pub fn new() -> Self {
        RakBuilder {
            serial_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            timing: Timing::default(),
            event_capacity: 256,
            discard_startup_output: true,
        }
    }

    /// Set the serial port path (e.g. `/dev/ttyUSB0` or `COM3`).
    pub fn serial_port(mut self, port: &str) -> Self {
        self.serial_port = Some(port.to_string());
        self
    }

    /// Override the default baud rate (115200).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.baud_rate = baud;
        self
    }

    /// Replace the settle delays and response windows.
    pub fn timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Capacity of the inbound frame broadcast (default: 256).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Whether to drain and log whatever the module printed before the
    /// gateway started talking to it (default: true).
    pub fn discard_startup_output(mut self, discard: bool) -> Self {
        self.discard_startup_output = discard;
        self
    }

    /// Build a [`RakRadio`] with a caller-provided transport.
    ///
    /// Waits the port settle period and drains the module's power-up output
    /// before the IO task takes over the transport.
    pub async fn build_with_transport(self, mut transport: Box<dyn Transport>) -> Result<RakRadio> {
        if self.event_capacity == 0 {
            return Err(Error::InvalidParameter(
                "event_capacity must be greater than zero".into(),
            ));
        }

        tokio::time::sleep(self.timing.port_settle).await;
        if self.discard_startup_output {
            drain_startup_output(&mut *transport).await?;
        }

        Ok(RakRadio::new(transport, self.timing, self.event_capacity))
    }

    /// Build a [`RakRadio`] over a serial port.
    ///
    /// Requires that [`serial_port()`](Self::serial_port) has been called.
    pub async fn build(self) -> Result<RakRadio> {
        let port = self
            .serial_port
            .as_ref()
            .ok_or_else(|| Error::InvalidParameter("serial_port is required for build()".into()))?;

        let transport = lorabridge_transport::SerialTransport::open(port, self.baud_rate).await?;
        self.build_with_transport(Box::new(transport)).await
    }
}

impl Default for RakBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Read and discard everything already buffered on the link.
async fn drain_startup_output(transport: &mut dyn Transport) -> Result<()> {
    let mut buf = [0u8; 256];
    let mut banner = Vec::new();
    loop {
        match transport.receive(&mut buf, Duration::ZERO).await {
            Ok(0) | Err(Error::Timeout) => break,
            Ok(n) => {
                banner.extend_from_slice(&buf[..n]);
                if banner.len() > 4096 {
                    break;
                }
            }
            Err(e) => return Err(e),
        }
    }
    if !banner.is_empty() {
        debug!(
            output = %String::from_utf8_lossy(&banner).trim(),
            "discarded startup output"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorabridge_core::types::TransferMode;
    use lorabridge_test_harness::MockTransport;

    #[test]
    fn builder_defaults() {
        let builder = RakBuilder::new();
        assert_eq!(builder.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(builder.timing, Timing::default());
        assert!(builder.discard_startup_output);
    }

    #[tokio::test]
    async fn builder_serial_port_required_for_build() {
        let result = RakBuilder::new().timing(Timing::immediate()).build().await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn builder_rejects_zero_event_capacity() {
        let result = RakBuilder::new()
            .timing(Timing::immediate())
            .event_capacity(0)
            .build_with_transport(Box::new(MockTransport::new()))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn builder_discards_startup_banner() {
        let mut mock = MockTransport::new();
        mock.push_inbound(b"RAK4270 version:3.0.0.14.H\r\nInitialization OK\r\n");
        mock.push_inbound(b"at+recv=-50,6:7B7D\r\n");
        mock.expect(b"at+set_config=lorap2p:transfer_mode:1\r\n", b"OK\r\n");

        let radio = RakBuilder::new()
            .serial_port("/dev/ttyUSB0")
            .timing(Timing::immediate())
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        let mut events = radio.subscribe();

        radio.set_mode(TransferMode::Receive).await.unwrap();
        // The banner, including the stale frame, was drained before the IO
        // task started.
        assert!(events.try_recv().is_err());

        radio.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn builder_keeps_startup_output_when_asked() {
        let mut mock = MockTransport::new();
        mock.push_inbound(b"Initialization OK\r\n");

        let radio = RakBuilder::new()
            .timing(Timing::immediate())
            .discard_startup_output(false)
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();

        let handle = radio.handle();
        assert!(handle.is_connected());
        radio.shutdown().await.unwrap();
    }
}
