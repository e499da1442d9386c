//! RakRadio -- a connected RAK module running the LoRa P2P firmware.
//!
//! Owns the IO task and the event broadcast. Bring-up, mode switching, and
//! bracketed sends all go through the same [`RakHandle`], so every stream
//! operation is serialized by the IO task.

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use lorabridge_core::error::{Error, Result};
use lorabridge_core::events::RadioEvent;
use lorabridge_core::transport::Transport;
use lorabridge_core::types::{AtCommand, AtResponse, RadioConfig, TransferMode};

use crate::commands;
use crate::io::{self, RakHandle, RakIo};
use crate::timing::Timing;

/// A RAK module reachable through a running IO task.
///
/// Constructed via [`RakBuilder`](crate::builder::RakBuilder).
pub struct RakRadio {
    io: RakIo,
    event_tx: broadcast::Sender<RadioEvent>,
    timing: Timing,
}

impl RakRadio {
    pub(crate) fn new(transport: Box<dyn Transport>, timing: Timing, event_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_capacity);
        let io = io::spawn_io_task(transport, timing, event_tx.clone());
        RakRadio {
            io,
            event_tx,
            timing,
        }
    }

    /// Subscribe to inbound frames and link failures.
    ///
    /// Frames are only delivered to receivers that exist when they arrive,
    /// so subscribe before bring-up if none may be missed.
    pub fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.event_tx.subscribe()
    }

    /// A cloneable send path into the radio, for the command bridge.
    pub fn handle(&self) -> RakHandle {
        self.io.handle().clone()
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Run a raw AT exchange.
    pub async fn execute(&self, command: AtCommand) -> Result<AtResponse> {
        self.io.handle().execute(command).await
    }

    /// Switch the P2P sub-mode.
    pub async fn set_mode(&self, mode: TransferMode) -> Result<()> {
        self.io.handle().set_mode(mode).await
    }

    /// Send a hex payload inside a transmit/receive bracket.
    pub async fn transmit(&self, payload_hex: &str) -> Result<()> {
        self.io.handle().transmit(payload_hex).await
    }

    /// Restart the module (`at+set_config=device:restart`) and wait for it to
    /// settle.
    pub async fn restart(&self) -> Result<()> {
        info!("restarting radio module");
        self.execute(commands::cmd_restart(self.timing.work_mode_timeout))
            .await?
            .into_result()?;
        tokio::time::sleep(self.timing.after_work_mode).await;
        Ok(())
    }

    /// Put the module into LoRa P2P mode with `config` and leave it
    /// listening.
    ///
    /// Each step is gated on the previous one. Any hard failure aborts the
    /// sequence and is returned; the radio must not be used for listening or
    /// sending afterwards.
    pub async fn bring_up(&self, config: &RadioConfig) -> Result<()> {
        config.validate()?;
        info!("initializing LoRa P2P");

        let version = self
            .execute(commands::cmd_version(self.timing.at_timeout))
            .await
            .and_then(AtResponse::into_result)
            .inspect_err(|e| error!(error = %e, "firmware version query failed"))?;
        if let Some(line) = version.lines.iter().find(|l| l.starts_with("OK V")) {
            info!(firmware = %line.trim_start_matches("OK "), "radio module detected");
        }
        tokio::time::sleep(self.timing.after_version).await;

        self.enter_p2p_work_mode()
            .await
            .inspect_err(|e| error!(error = %e, "switch to P2P work mode failed"))?;
        tokio::time::sleep(self.timing.after_work_mode).await;

        self.execute(commands::cmd_set_p2p_config(config, self.timing.at_timeout))
            .await
            .and_then(AtResponse::into_result)
            .inspect_err(|e| error!(error = %e, "RF configuration rejected"))?;
        tokio::time::sleep(self.timing.after_p2p_config).await;

        self.set_mode(TransferMode::Receive)
            .await
            .inspect_err(|e| error!(error = %e, "switch to receive mode failed"))?;

        info!(
            frequency_hz = config.frequency_hz,
            spreading_factor = config.spreading_factor,
            tx_power = config.tx_power,
            "P2P setup complete, receiving"
        );
        Ok(())
    }

    /// Work-mode change with a tolerated confirmation.
    ///
    /// The module re-initialises on this command and its confirmation often
    /// arrives split or late. An explicit `ERROR:` line or total silence is
    /// a failure. Any other output without the expected confirmation is
    /// accepted with a warning.
    async fn enter_p2p_work_mode(&self) -> Result<()> {
        let response = self
            .execute(commands::cmd_set_work_mode_p2p(self.timing.work_mode_timeout))
            .await?;
        if response.matched {
            debug!("P2P work mode confirmed");
            return Ok(());
        }
        if let Some(line) = response.error_line {
            return Err(Error::Radio(line));
        }
        if response.lines.is_empty() {
            return Err(Error::Timeout);
        }
        warn!(
            lines = ?response.lines,
            "P2P work mode confirmation not seen, continuing"
        );
        Ok(())
    }

    /// Stop the IO task and close the serial port.
    pub async fn shutdown(self) -> Result<()> {
        let mut transport = self.io.shutdown().await?;
        transport.close().await
    }
}
