//! Gateway lifecycle: bring-up, the two concurrent halves, and shutdown.
//!
//! [`Gateway::start`] runs bring-up to completion before anything else
//! touches the radio. Only then are the frame listener and the command
//! bridge spawned. Both go through the radio's IO task, which serializes
//! their use of the serial stream.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lorabridge_core::error::Result;
use lorabridge_rak::RakRadio;

use crate::bridge::CommandBridge;
use crate::bus::{BusMessage, MessageBus};
use crate::config::GatewayConfig;
use crate::listener::{FrameListener, ListenerExit};

/// How long shutdown waits for the listener to drain.
pub const LISTENER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How the gateway stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayExit {
    /// Requested shutdown.
    Shutdown,
    /// The serial link failed; the process owner should restart or alert.
    LinkLost(String),
}

/// A running gateway.
pub struct Gateway {
    radio: RakRadio,
    cancel: CancellationToken,
    listener: JoinHandle<ListenerExit>,
    bridge: JoinHandle<()>,
}

impl Gateway {
    /// Bring the radio up, then start the listener and the bridge.
    ///
    /// On a bring-up failure the radio is shut down and the error returned;
    /// neither half is started.
    pub async fn start(
        radio: RakRadio,
        config: &GatewayConfig,
        bus: Arc<dyn MessageBus>,
        commands: mpsc::Receiver<BusMessage>,
    ) -> Result<Self> {
        let prepared = async {
            if config.reset_on_start {
                radio.restart().await?;
            }
            radio.bring_up(&config.radio).await
        }
        .await;
        if let Err(e) = prepared {
            error!(error = %e, "radio bring-up failed");
            if let Err(close_err) = radio.shutdown().await {
                warn!(error = %close_err, "failed to close radio after bring-up failure");
            }
            return Err(e);
        }

        let cancel = CancellationToken::new();
        let listener = FrameListener::new(bus, config.topics.telemetry.clone());
        let listener = tokio::spawn(listener.run(radio.subscribe(), cancel.clone()));
        let bridge = CommandBridge::new(radio.handle(), config.topics.clone());
        let bridge = tokio::spawn(bridge.run(commands, cancel.clone()));

        info!("gateway running");
        Ok(Gateway {
            radio,
            cancel,
            listener,
            bridge,
        })
    }

    /// Token that stops both halves when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until `shutdown` resolves or the radio link is lost, then stop.
    pub async fn run<F>(self, shutdown: F) -> GatewayExit
    where
        F: Future<Output = ()>,
    {
        let Gateway {
            radio,
            cancel,
            mut listener,
            bridge,
        } = self;

        let (exit, listener) = tokio::select! {
            biased;
            _ = shutdown => {
                info!("shutdown requested");
                (GatewayExit::Shutdown, Some(listener))
            }
            _ = cancel.cancelled() => (GatewayExit::Shutdown, Some(listener)),
            joined = &mut listener => (listener_exit(joined), None),
        };

        cancel.cancel();
        let bridge_budget = radio.timing().transmit_budget() + Duration::from_secs(1);
        join_bounded("command bridge", bridge, bridge_budget).await;

        if let Err(e) = radio.shutdown().await {
            warn!(error = %e, "radio shutdown incomplete");
        }

        if let Some(listener) = listener {
            join_bounded("frame listener", listener, LISTENER_JOIN_TIMEOUT).await;
        }

        info!(?exit, "gateway stopped");
        exit
    }

    /// Stop immediately.
    pub async fn stop(self) -> GatewayExit {
        self.run(std::future::ready(())).await
    }
}

fn listener_exit(joined: std::result::Result<ListenerExit, JoinError>) -> GatewayExit {
    match joined {
        Ok(ListenerExit::LinkLost(reason)) => GatewayExit::LinkLost(reason),
        Ok(ListenerExit::Cancelled) | Ok(ListenerExit::Closed) => GatewayExit::Shutdown,
        Err(e) => GatewayExit::LinkLost(format!("frame listener failed: {e}")),
    }
}

async fn join_bounded<T>(name: &str, mut task: JoinHandle<T>, limit: Duration) {
    match tokio::time::timeout(limit, &mut task).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(task = name, error = %e, "task ended abnormally"),
        Err(_) => {
            warn!(task = name, "task did not stop in time, aborting");
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::RecordingBus;
    use lorabridge_codec::hex::encode_hex;
    use lorabridge_core::Error;
    use lorabridge_rak::{RakBuilder, Timing};
    use lorabridge_test_harness::{InboundQueue, MockTransport, SentLog};

    const VERSION: &[u8] = b"at+version\r\n";
    const WORK_MODE: &[u8] = b"at+set_config=lora:work_mode:1\r\n";
    const P2P_CONFIG: &[u8] = b"at+set_config=lorap2p:869525000:7:0:1:5:5\r\n";
    const TX_MODE: &[u8] = b"at+set_config=lorap2p:transfer_mode:2\r\n";
    const RX_MODE: &[u8] = b"at+set_config=lorap2p:transfer_mode:1\r\n";

    fn bring_up_script(mock: &mut MockTransport) {
        mock.expect(VERSION, b"OK V3.0.0.14.H\r\n");
        mock.expect(WORK_MODE, b"Initialization OK\r\n");
        mock.expect(P2P_CONFIG, b"OK\r\n");
        mock.expect(RX_MODE, b"OK\r\n");
    }

    async fn start(
        mock: MockTransport,
        config: &GatewayConfig,
    ) -> (
        Result<Gateway>,
        Arc<RecordingBus>,
        mpsc::Sender<BusMessage>,
        SentLog,
        InboundQueue,
    ) {
        let log = mock.sent_log();
        let inbound = mock.inbound();
        let radio = RakBuilder::new()
            .timing(Timing::immediate())
            .build_with_transport(Box::new(mock))
            .await
            .unwrap();
        let bus = Arc::new(RecordingBus::default());
        let (tx, rx) = mpsc::channel(8);
        let gateway = Gateway::start(radio, config, bus.clone(), rx).await;
        (gateway, bus, tx, log, inbound)
    }

    #[tokio::test]
    async fn frames_flow_to_bus_after_bring_up() {
        let mut mock = MockTransport::new();
        bring_up_script(&mut mock);
        let config = GatewayConfig::default();
        let (gateway, bus, _tx, log, inbound) = start(mock, &config).await;
        let gateway = gateway.unwrap();
        assert_eq!(log.len(), 4);

        let line = format!("at+recv=-58,9:{}\r\n", encode_hex(r#"{"i":"R1","av":[1]}"#));
        inbound.push(line.as_bytes());

        let published = tokio::time::timeout(Duration::from_secs(1), bus.wait_for(1))
            .await
            .unwrap();
        assert_eq!(published[0].topic, config.topics.telemetry);
        let v: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(v["actuator_status"]["WATER_PUMP"], "ON");

        assert_eq!(gateway.stop().await, GatewayExit::Shutdown);
    }

    #[tokio::test]
    async fn commands_flow_to_radio() {
        let mut mock = MockTransport::new();
        bring_up_script(&mut mock);
        mock.expect(TX_MODE, b"OK\r\n");
        let send = format!(
            "at+send=lorap2p:{}\r\n",
            encode_hex(r#"{"md":1,"act":{"wp":1,"phr":0,"nr":0}}"#)
        );
        mock.expect(send.as_bytes(), b"OK\r\n");
        mock.expect(RX_MODE, b"OK\r\n");
        let config = GatewayConfig::default();
        let (gateway, _bus, tx, log, _inbound) = start(mock, &config).await;
        let gateway = gateway.unwrap();

        tx.send(BusMessage::new(
            "hydroponics/room1/command/actuator/wp",
            "ON",
        ))
        .await
        .unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), async {
            while log.len() < 7 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(gateway.stop().await, GatewayExit::Shutdown);
        assert_eq!(
            log.lines().last().map(String::as_str),
            Some("at+set_config=lorap2p:transfer_mode:1")
        );
    }

    #[tokio::test]
    async fn bring_up_failure_starts_nothing() {
        let mut mock = MockTransport::new();
        mock.expect(VERSION, b"ERROR: 1\r\n");
        let config = GatewayConfig::default();
        let (gateway, bus, _tx, log, _inbound) = start(mock, &config).await;

        assert!(matches!(gateway, Err(Error::Radio(_))));
        assert_eq!(log.len(), 1);
        assert!(bus.published().is_empty());
    }

    #[tokio::test]
    async fn reset_on_start_restarts_first() {
        let mut mock = MockTransport::new();
        mock.expect(
            b"at+set_config=device:restart\r\n",
            b"Initialization OK\r\n",
        );
        bring_up_script(&mut mock);
        let config = GatewayConfig {
            reset_on_start: true,
            ..Default::default()
        };
        let (gateway, _bus, _tx, log, _inbound) = start(mock, &config).await;
        let gateway = gateway.unwrap();

        assert_eq!(log.lines()[0], "at+set_config=device:restart");
        assert_eq!(log.len(), 5);
        gateway.stop().await;
    }

    #[tokio::test]
    async fn link_fault_ends_run() {
        let mut mock = MockTransport::new();
        bring_up_script(&mut mock);
        let config = GatewayConfig::default();
        let (gateway, _bus, _tx, _log, inbound) = start(mock, &config).await;
        let gateway = gateway.unwrap();

        inbound.push_link_fault();
        let exit = tokio::time::timeout(
            Duration::from_secs(2),
            gateway.run(std::future::pending::<()>()),
        )
        .await
        .unwrap();
        assert!(matches!(exit, GatewayExit::LinkLost(_)));
    }

    #[tokio::test]
    async fn external_cancel_stops_run() {
        let mut mock = MockTransport::new();
        bring_up_script(&mut mock);
        let config = GatewayConfig::default();
        let (gateway, _bus, _tx, _log, _inbound) = start(mock, &config).await;
        let gateway = gateway.unwrap();

        let token = gateway.cancel_token();
        let run = tokio::spawn(gateway.run(std::future::pending::<()>()));
        token.cancel();
        let exit = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, GatewayExit::Shutdown);
    }
}
