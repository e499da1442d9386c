//! LoRa-to-MQTT gateway logic.
//!
//! Sits between the radio driver (`lorabridge-rak`) and a message bus:
//!
//! ```text
//! radio bytes -> IO task -> RadioEvent -> FrameListener -> codec -> bus publish
//! bus message -> CommandBridge -> codec -> RakHandle::transmit -> radio bytes
//! ```
//!
//! - [`config`] -- TOML configuration for the whole gateway.
//! - [`bus`] -- the [`MessageBus`] seam the binary implements over MQTT.
//! - [`listener`] -- republishes inbound frames as verbose telemetry.
//! - [`bridge`] -- turns bus commands into bracketed radio sends.
//! - [`gateway`] -- bring-up gating, task supervision, and shutdown.

pub mod bridge;
pub mod bus;
pub mod config;
pub mod gateway;
pub mod listener;

pub use bridge::{BridgeError, CommandBridge, Route};
pub use bus::{BusError, BusMessage, MessageBus};
pub use config::{ConfigError, GatewayConfig, MqttConfig, SerialConfig, TimingConfig, TopicConfig};
pub use gateway::{Gateway, GatewayExit};
pub use listener::{FrameListener, ListenerExit};
