//! Payload codec for the LoRa gateway.
//!
//! Two independent conversions live here:
//!
//! - **Hex** ([`hex`]) -- text to and from the uppercase hex digits carried
//!   on the AT line, with a character budget on the way out.
//! - **Schema** ([`telemetry`], [`command`]) -- the compact JSON exchanged
//!   with the node versus the verbose JSON exchanged on the bus. Telemetry
//!   only flows radio to bus, commands only bus to radio, so each direction
//!   has exactly one translation.
//!
//! The positional tables both directions rely on are in [`schema`].
//!
//! # Example
//!
//! ```
//! use lorabridge_codec::{build_manual_command, expand_frame_payload, hex};
//!
//! let cmd = build_manual_command("wp", "ON").unwrap();
//! assert_eq!(cmd.to_compact_json().unwrap(), r#"{"md":1,"act":{"wp":1,"phr":0,"nr":0}}"#);
//!
//! let frame = hex::encode_hex(r#"{"i":"R1","m":0,"sv":[65]}"#);
//! let verbose = expand_frame_payload(&frame).unwrap();
//! assert_eq!(verbose.sensor("pH").unwrap().value.as_ref().unwrap().as_f64(), Some(6.5));
//! ```

pub mod command;
pub mod error;
pub mod hex;
pub mod schema;
pub mod telemetry;

pub use command::{Command, build_auto_command, build_manual_command};
pub use error::{CodecError, Result};
pub use telemetry::{
    ActuatorState, CompactTelemetry, Mode, SensorReading, VerboseTelemetry, compact_to_verbose,
    expand_frame_payload, to_pretty_json,
};
