//! RAK P2P AT command builders.
//!
//! Each function returns a fully described [`AtCommand`]: the line to send,
//! the reply prefix that means success, the response window, and whether the
//! exchange is logged. All functions are pure; the IO task does the sending.
//!
//! # Command reference
//!
//! Based on the RAK4270 AT command manual (firmware 3.x):
//!
//! | Command                                   | Success reply            |
//! |-------------------------------------------|--------------------------|
//! | `at+version`                              | `OK V<version>`          |
//! | `at+set_config=device:restart`            | `Initialization OK`      |
//! | `at+set_config=lora:work_mode:1`          | `Current work_mode:P2P`  |
//! | `at+set_config=lorap2p:<f>:<sf>:<bw>:<cr>:<pre>:<pwr>` | `OK`        |
//! | `at+set_config=lorap2p:transfer_mode:<n>` | `OK`                     |
//! | `at+send=lorap2p:<hex>`                   | `OK`                     |

use std::time::Duration;

use lorabridge_core::types::{AtCommand, Completion, RadioConfig, TransferMode};

/// Longest hex payload that fits in one `at+send=lorap2p:` line.
pub const MAX_PAYLOAD_HEX_CHARS: usize = 235;

/// Build a firmware version query (`at+version`).
pub fn cmd_version(timeout: Duration) -> AtCommand {
    AtCommand::new("at+version").expect("OK V").timeout(timeout)
}

/// Build a module restart (`at+set_config=device:restart`).
pub fn cmd_restart(timeout: Duration) -> AtCommand {
    AtCommand::new("at+set_config=device:restart")
        .expect(crate::protocol::INIT_OK)
        .timeout(timeout)
        .completion(Completion::ModeChange)
}

/// Build the switch to LoRa P2P work mode (`at+set_config=lora:work_mode:1`).
///
/// The module restarts its radio stack on this command, so the reply may be
/// either the mode confirmation or the re-initialisation banner.
pub fn cmd_set_work_mode_p2p(timeout: Duration) -> AtCommand {
    AtCommand::new("at+set_config=lora:work_mode:1")
        .expect("Current work_mode:P2P")
        .timeout(timeout)
        .completion(Completion::ModeChange)
}

/// Build the single RF configuration command covering all six parameters.
pub fn cmd_set_p2p_config(config: &RadioConfig, timeout: Duration) -> AtCommand {
    AtCommand::new(format!(
        "at+set_config=lorap2p:{}:{}:{}:{}:{}:{}",
        config.frequency_hz,
        config.spreading_factor,
        config.bandwidth,
        config.coding_rate,
        config.preamble_length,
        config.tx_power
    ))
    .timeout(timeout)
}

/// Build a receive/transmit sub-mode switch. Silent: it runs twice per send.
pub fn cmd_set_transfer_mode(mode: TransferMode, timeout: Duration) -> AtCommand {
    AtCommand::new(format!("at+set_config=lorap2p:transfer_mode:{}", mode.code()))
        .timeout(timeout)
        .silent(true)
}

/// Build a P2P send of an already hex-encoded payload. Silent.
pub fn cmd_send_p2p(payload_hex: &str, timeout: Duration) -> AtCommand {
    AtCommand::new(format!("at+send=lorap2p:{payload_hex}"))
        .timeout(timeout)
        .silent(true)
}
