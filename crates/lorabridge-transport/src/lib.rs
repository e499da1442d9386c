//! Transport implementations for the gateway.
//!
//! This crate provides [`SerialTransport`], the concrete
//! [`Transport`](lorabridge_core::Transport) used to talk to a RAK LoRa module
//! over a USB virtual COM port or a UART.
//!
//! # Example
//!
//! ```no_run
//! use lorabridge_transport::SerialTransport;
//! use lorabridge_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> lorabridge_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 115_200).await?;
//! transport.send(b"at+version\r\n").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(2)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::SerialTransport;
