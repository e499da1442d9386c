//! MQTT side of the gateway, over `rumqttc`.
//!
//! [`MqttBus`] publishes telemetry at QoS 0. The event loop task drives the
//! client connection, re-subscribes to the command topics on every
//! `ConnAck`, and forwards inbound publishes to the command bridge.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lorabridge_gateway::{BusError, BusMessage, MessageBus, MqttConfig, TopicConfig};

/// Requests the client may queue before `publish` waits on the event loop.
const CLIENT_CAPACITY: usize = 64;

/// Inbound command messages buffered ahead of the bridge.
const COMMAND_CAPACITY: usize = 32;

/// Pause after a connection error before polling again.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Publishing half of the MQTT client.
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
}

#[async_trait]
impl MessageBus for MqttBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| BusError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

impl MqttBus {
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect request not delivered");
        }
    }
}

/// A running MQTT client.
pub struct MqttSession {
    pub bus: MqttBus,
    pub commands: mpsc::Receiver<BusMessage>,
    pub stop: CancellationToken,
    pub task: JoinHandle<()>,
}

/// Create the client and spawn its event loop.
///
/// The broker connection itself is made lazily by the event loop, so this
/// never fails; connection errors are logged and retried.
pub fn connect(config: &MqttConfig, topics: &TopicConfig) -> MqttSession {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    options.set_clean_session(true);

    let (client, eventloop) = AsyncClient::new(options, CLIENT_CAPACITY);
    let (command_tx, commands) = mpsc::channel(COMMAND_CAPACITY);
    let stop = CancellationToken::new();

    let filters = vec![topics.auto_command.clone(), topics.actuator_filter()];
    info!(host = %config.host, port = config.port, "connecting to MQTT broker");
    let task = tokio::spawn(event_loop(
        eventloop,
        client.clone(),
        filters,
        command_tx,
        stop.clone(),
    ));

    MqttSession {
        bus: MqttBus { client },
        commands,
        stop,
        task,
    }
}

async fn event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    filters: Vec<String>,
    command_tx: mpsc::Sender<BusMessage>,
    stop: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            event = eventloop.poll() => event,
        };

        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("connected to MQTT broker");
                for filter in &filters {
                    // The request queue is drained by this very loop, so never
                    // wait on it here.
                    match client.try_subscribe(filter.as_str(), QoS::AtMostOnce) {
                        Ok(()) => info!(topic = %filter, "subscribed"),
                        Err(e) => warn!(topic = %filter, error = %e, "subscribe failed"),
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(topic = %publish.topic, bytes = publish.payload.len(), "command message");
                let message = BusMessage::new(publish.topic, publish.payload.to_vec());
                if !forward_command(&command_tx, message) {
                    debug!("command bridge gone, stopping MQTT event loop");
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("broker closed the connection");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("disconnected from MQTT broker");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "MQTT connection error, retrying");
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }
    debug!("MQTT event loop stopped");
}

/// Hand a command to the bridge without waiting.
///
/// The event loop also carries telemetry and keep-alives, so a busy bridge
/// must not stall it: when the queue is full the command is dropped.
/// Returns `false` once the bridge has gone away.
fn forward_command(command_tx: &mpsc::Sender<BusMessage>, message: BusMessage) -> bool {
    match command_tx.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(message)) => {
            warn!(
                topic = %message.topic,
                payload = %message.payload_str(),
                "command queue full, dropping command"
            );
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_command_queues_while_there_is_room() {
        let (tx, mut rx) = mpsc::channel(2);
        assert!(forward_command(&tx, BusMessage::new("a", "1")));
        assert!(forward_command(&tx, BusMessage::new("b", "2")));
        assert_eq!(rx.try_recv().unwrap().topic, "a");
        assert_eq!(rx.try_recv().unwrap().topic, "b");
    }

    #[test]
    fn forward_command_drops_when_full() {
        let (tx, mut rx) = mpsc::channel(1);
        assert!(forward_command(&tx, BusMessage::new("first", "ON")));
        assert!(forward_command(&tx, BusMessage::new("second", "OFF")));

        assert_eq!(rx.try_recv().unwrap().topic, "first");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn forward_command_reports_closed_bridge() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(!forward_command(&tx, BusMessage::new("a", "ON")));
    }
}
