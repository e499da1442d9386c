//! The message bus seen from the gateway.
//!
//! The gateway publishes telemetry and consumes commands but knows nothing
//! about the broker client. The binary adapts its MQTT client to
//! [`MessageBus`] for the outbound side and feeds inbound publishes to the
//! command bridge as [`BusMessage`]s.

use async_trait::async_trait;

/// Failure to hand a message to the bus client.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("bus client disconnected")]
    Disconnected,
}

/// One inbound message from the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Payload as text, with invalid UTF-8 replaced.
    pub fn payload_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Outbound side of the bus. Delivery is at most once.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording bus double for gateway tests.

    use super::*;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    #[derive(Default)]
    pub struct RecordingBus {
        published: Mutex<Vec<BusMessage>>,
        notify: Notify,
        fail: bool,
    }

    impl RecordingBus {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn published(&self) -> Vec<BusMessage> {
            self.published.lock().map(|p| p.clone()).unwrap_or_default()
        }

        /// Wait until at least `n` messages were published.
        pub async fn wait_for(&self, n: usize) -> Vec<BusMessage> {
            loop {
                let notified = self.notify.notified();
                let published = self.published();
                if published.len() >= n {
                    return published;
                }
                notified.await;
            }
        }
    }

    #[async_trait]
    impl MessageBus for RecordingBus {
        async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
            if let Ok(mut p) = self.published.lock() {
                p.push(BusMessage::new(topic, payload));
            }
            self.notify.notify_waiters();
            if self.fail {
                return Err(BusError::Publish {
                    topic: topic.to_string(),
                    reason: "broker unavailable".into(),
                });
            }
            Ok(())
        }
    }
}
