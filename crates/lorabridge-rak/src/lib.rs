//! RAK LoRa P2P backend for the gateway.
//!
//! This crate drives a RAK4270-class module through its AT command set and
//! keeps the module's single serial stream under one owner. It provides:
//!
//! - **Line protocol** ([`protocol`]) -- CR+LF framing, response matching
//!   with `ERROR:` precedence and the mode-change completion rule, and
//!   parsing of `at+recv=` receive notifications.
//! - **Command builders** ([`commands`]) -- the handful of AT commands the
//!   gateway issues, each paired with its success prefix and window.
//! - **Timing** ([`timing`]) -- settle delays the module needs between mode
//!   changes, and the response windows.
//! - **IO task** ([`io`]) -- the one task that owns the stream, runs AT
//!   exchanges and transmit brackets on request, and broadcasts inbound
//!   frames while idle.
//! - **Radio** ([`radio`]) -- bring-up into P2P mode, restart, mode control.
//! - **Builder** ([`builder`]) -- opens the port, waits for the module to
//!   settle, and spawns the IO task.
//!
//! # Half-duplex sends
//!
//! The module can either listen or transmit. Every send is bracketed by a
//! switch to transmit mode and a switch back to receive mode, and the switch
//! back happens whether or not the send succeeded:
//!
//! ```text
//! at+set_config=lorap2p:transfer_mode:2   -> OK
//! at+send=lorap2p:<hex>                   -> OK
//! at+set_config=lorap2p:transfer_mode:1   -> OK
//! ```

pub mod builder;
pub mod commands;
pub mod io;
pub mod protocol;
pub mod radio;
pub mod timing;

pub use builder::RakBuilder;
pub use io::RakHandle;
pub use radio::RakRadio;
pub use timing::Timing;
