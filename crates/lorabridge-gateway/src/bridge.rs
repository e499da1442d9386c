//! Command bridge: bus commands translated and sent over the radio.
//!
//! Each inbound message is routed by topic, built into a compact command,
//! hex-encoded against the send budget, and handed to the radio's bracketed
//! send exactly once. Nothing is retried. A failure is logged and the
//! command dropped; the next message is handled as if nothing happened.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lorabridge_codec::{CodecError, Command, build_auto_command, build_manual_command, hex};
use lorabridge_rak::RakHandle;
use lorabridge_rak::commands::MAX_PAYLOAD_HEX_CHARS;

use crate::bus::BusMessage;
use crate::config::TopicConfig;

/// Why a single command was not sent.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("no command handler for topic {0}")]
    UnroutedTopic(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("radio send failed: {0}")]
    Radio(#[from] lorabridge_core::Error),
}

/// Which command family a topic belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Auto,
    /// Actuator command; carries the topic's last segment.
    Actuator(String),
}

pub struct CommandBridge {
    radio: RakHandle,
    topics: TopicConfig,
}

impl CommandBridge {
    pub fn new(radio: RakHandle, topics: TopicConfig) -> Self {
        Self { radio, topics }
    }

    /// Route a topic to a command family.
    pub fn route(&self, topic: &str) -> Option<Route> {
        if topic == self.topics.auto_command {
            return Some(Route::Auto);
        }
        let rest = topic
            .strip_prefix(self.topics.actuator_command.as_str())?
            .strip_prefix('/')?;
        let name = rest.rsplit('/').next().unwrap_or(rest);
        Some(Route::Actuator(name.to_string()))
    }

    /// Translate one message into a compact command without sending it.
    pub fn translate(&self, message: &BusMessage) -> Result<Command, BridgeError> {
        let payload = message.payload_str();
        match self.route(&message.topic) {
            Some(Route::Auto) => Ok(build_auto_command(&payload)?),
            Some(Route::Actuator(name)) => Ok(build_manual_command(&name, &payload)?),
            None => Err(BridgeError::UnroutedTopic(message.topic.clone())),
        }
    }

    /// Translate and send one message.
    pub async fn handle_message(&self, message: &BusMessage) -> Result<(), BridgeError> {
        let compact = self.translate(message)?.to_compact_json()?;
        let payload_hex = hex::encode_payload(&compact, MAX_PAYLOAD_HEX_CHARS)?;
        debug!(topic = %message.topic, command = %compact, "sending command over LoRa");
        self.radio.transmit(&payload_hex).await?;
        Ok(())
    }

    /// Handle inbound messages until cancelled or the bus side closes.
    pub async fn run(self, mut inbound: mpsc::Receiver<BusMessage>, cancel: CancellationToken) {
        info!(
            auto = %self.topics.auto_command,
            actuators = %self.topics.actuator_filter(),
            "command bridge started"
        );
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                msg = inbound.recv() => match msg {
                    Some(m) => m,
                    None => break,
                },
            };

            match self.handle_message(&message).await {
                Ok(()) => info!(topic = %message.topic, "command sent"),
                Err(e) => warn!(
                    topic = %message.topic,
                    payload = %message.payload_str(),
                    error = %e,
                    "command dropped"
                ),
            }
        }
        info!("command bridge stopped");
    }
}
