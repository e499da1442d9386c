//! lorabridge-core: Core traits, types, and error definitions for the gateway.
//!
//! This crate defines the radio-agnostic pieces every other gateway crate
//! builds on. The AT driver, the serial transport, and the bridge logic all
//! speak in terms of these types.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel to the radio module
//! - [`RadioEvent`] -- asynchronous notifications from the radio IO task
//! - [`RadioConfig`] / [`AtCommand`] / [`AtResponse`] -- protocol data model
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use lorabridge_core::*`.
pub use error::{Error, Result};
pub use events::RadioEvent;
pub use transport::Transport;
pub use types::*;
