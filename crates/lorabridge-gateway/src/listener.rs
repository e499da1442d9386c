//! Frame listener: inbound radio frames republished on the bus.
//!
//! The IO task does the reading; the listener consumes the resulting
//! [`RadioEvent`]s, expands each frame to the verbose schema, and publishes
//! it on the telemetry topic. Every per-frame failure (bad hex, bad JSON, a
//! failed publish) is logged and the frame dropped. Only a lost link or the
//! stop signal ends the loop.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lorabridge_codec::telemetry;
use lorabridge_core::events::RadioEvent;
use lorabridge_core::types::InboundFrame;

use crate::bus::MessageBus;

/// Why the listener stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerExit {
    /// The stop signal was raised.
    Cancelled,
    /// The IO task lost the serial link.
    LinkLost(String),
    /// The event channel closed without a link failure.
    Closed,
}

pub struct FrameListener {
    bus: Arc<dyn MessageBus>,
    topic: String,
}

impl FrameListener {
    pub fn new(bus: Arc<dyn MessageBus>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }

    /// Run until cancelled or the radio goes away.
    pub async fn run(
        self,
        mut events: broadcast::Receiver<RadioEvent>,
        cancel: CancellationToken,
    ) -> ListenerExit {
        info!(topic = %self.topic, "frame listener started");
        let exit = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break ListenerExit::Cancelled,

                event = events.recv() => match event {
                    Ok(RadioEvent::FrameReceived(frame)) => self.handle_frame(&frame).await,
                    Ok(RadioEvent::LinkLost { reason }) => {
                        error!(reason = %reason, "radio link lost, listener stopping");
                        break ListenerExit::LinkLost(reason);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "listener fell behind, frames dropped");
                    }
                    Err(RecvError::Closed) => break ListenerExit::Closed,
                },
            }
        };
        info!(?exit, "frame listener stopped");
        exit
    }

    /// Decode, expand, and publish one frame.
    pub async fn handle_frame(&self, frame: &InboundFrame) {
        let verbose = match telemetry::expand_frame_payload(&frame.payload_hex) {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    rssi = frame.rssi,
                    snr = frame.snr,
                    payload = %frame.payload_hex,
                    error = %e,
                    "dropping undecodable frame"
                );
                return;
            }
        };
        let json = match telemetry::to_pretty_json(&verbose) {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "failed to serialize telemetry");
                return;
            }
        };

        match self.bus.publish(&self.topic, json.into_bytes()).await {
            Ok(()) => debug!(
                rssi = frame.rssi,
                snr = frame.snr,
                room_id = %verbose.room_id,
                topic = %self.topic,
                "published telemetry"
            ),
            Err(e) => warn!(topic = %self.topic, error = %e, "telemetry publish failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::RecordingBus;
    use lorabridge_codec::hex::encode_hex;
    use std::time::Duration;

    const TOPIC: &str = "hydroponics/room1/telemetry_verbose";

    fn frame(json: &str) -> InboundFrame {
        InboundFrame {
            rssi: -60,
            snr: 7,
            len: None,
            payload_hex: encode_hex(json),
        }
    }

    fn spawn_listener(
        bus: Arc<RecordingBus>,
    ) -> (
        broadcast::Sender<RadioEvent>,
        CancellationToken,
        tokio::task::JoinHandle<ListenerExit>,
    ) {
        let (tx, rx) = broadcast::channel(16);
        let cancel = CancellationToken::new();
        let listener = FrameListener::new(bus, TOPIC);
        let task = tokio::spawn(listener.run(rx, cancel.clone()));
        (tx, cancel, task)
    }

    #[tokio::test]
    async fn frame_is_published_verbose() {
        let bus = Arc::new(RecordingBus::default());
        let listener = FrameListener::new(bus.clone(), TOPIC);

        listener
            .handle_frame(&frame(
                r#"{"i":"R1","m":0,"sv":[65,120,250],"ss":[65,120,250],"av":[1,0,0],"x":0}"#,
            ))
            .await;

        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, TOPIC);
        let v: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(v["sensors"]["pH"]["value"], serde_json::json!(6.5));
        assert_eq!(v["actuator_status"]["WATER_PUMP"], "ON");
    }

    #[tokio::test]
    async fn undecodable_frames_are_dropped() {
        let bus = Arc::new(RecordingBus::default());
        let listener = FrameListener::new(bus.clone(), TOPIC);

        let mut odd = frame("{}");
        odd.payload_hex.push('A');
        listener.handle_frame(&odd).await;

        let mut bad_digit = frame("{}");
        bad_digit.payload_hex = "7Z7D".into();
        listener.handle_frame(&bad_digit).await;

        listener.handle_frame(&frame("not json")).await;

        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn bad_frame_does_not_stop_the_loop() {
        let bus = Arc::new(RecordingBus::default());
        let (tx, cancel, task) = spawn_listener(bus.clone());

        let mut bad = frame("{}");
        bad.payload_hex = "XYZ".into();
        tx.send(RadioEvent::FrameReceived(bad)).unwrap();
        tx.send(RadioEvent::FrameReceived(frame(r#"{"i":"R9"}"#)))
            .unwrap();

        let published = tokio::time::timeout(Duration::from_secs(1), bus.wait_for(1))
            .await
            .unwrap();
        let v: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(v["room_id"], "R9");

        cancel.cancel();
        assert_eq!(task.await.unwrap(), ListenerExit::Cancelled);
    }

    #[tokio::test]
    async fn publish_failure_is_not_fatal() {
        let bus = Arc::new(RecordingBus::failing());
        let (tx, cancel, task) = spawn_listener(bus.clone());

        tx.send(RadioEvent::FrameReceived(frame("{}"))).unwrap();
        tx.send(RadioEvent::FrameReceived(frame("{}"))).unwrap();
        tokio::time::timeout(Duration::from_secs(1), bus.wait_for(2))
            .await
            .unwrap();

        cancel.cancel();
        assert_eq!(task.await.unwrap(), ListenerExit::Cancelled);
    }

    #[tokio::test]
    async fn link_lost_ends_the_loop() {
        let bus = Arc::new(RecordingBus::default());
        let (tx, _cancel, task) = spawn_listener(bus);

        tx.send(RadioEvent::LinkLost {
            reason: "connection lost".into(),
        })
        .unwrap();

        let exit = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, ListenerExit::LinkLost("connection lost".into()));
    }

    #[tokio::test]
    async fn closed_channel_ends_the_loop() {
        let bus = Arc::new(RecordingBus::default());
        let (tx, _cancel, task) = spawn_listener(bus);
        drop(tx);
        assert_eq!(task.await.unwrap(), ListenerExit::Closed);
    }
}
