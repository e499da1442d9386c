//! Shared protocol types for the LoRa P2P gateway.
//!
//! These types describe the radio's configuration and the shape of a single
//! AT exchange. They carry no I/O; the protocol engine in `lorabridge-rak`
//! consumes and produces them.

use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// RadioConfig
// ---------------------------------------------------------------------------

/// Accepted carrier frequencies in hertz.
pub const FREQUENCY_RANGE_HZ: RangeInclusive<u32> = 150_000_000..=960_000_000;
/// Accepted LoRa spreading factors.
pub const SPREADING_FACTOR_RANGE: RangeInclusive<u8> = 6..=12;
/// Accepted bandwidth indices (0 = 125 kHz, 1 = 250 kHz, 2 = 500 kHz).
pub const BANDWIDTH_RANGE: RangeInclusive<u8> = 0..=2;
/// Accepted coding rate indices (1 = 4/5 .. 4 = 4/8).
pub const CODING_RATE_RANGE: RangeInclusive<u8> = 1..=4;
/// Accepted preamble lengths in symbols.
pub const PREAMBLE_RANGE: RangeInclusive<u16> = 5..=65535;
/// Accepted transmit power indices.
pub const TX_POWER_RANGE: RangeInclusive<u8> = 0..=20;

/// Peer-to-peer RF parameters, applied once during bring-up.
///
/// Defaults match the remote farm node's firmware: 869.525 MHz, SF7,
/// 125 kHz, CR 4/5, preamble 5, tx power index 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    pub frequency_hz: u32,
    pub spreading_factor: u8,
    pub bandwidth: u8,
    pub coding_rate: u8,
    pub preamble_length: u16,
    pub tx_power: u8,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 869_525_000,
            spreading_factor: 7,
            bandwidth: 0,
            coding_rate: 1,
            preamble_length: 5,
            tx_power: 5,
        }
    }
}

impl RadioConfig {
    /// Check every field against the ranges the module's AT grammar accepts.
    pub fn validate(&self) -> Result<()> {
        check_range("frequency_hz", self.frequency_hz, &FREQUENCY_RANGE_HZ)?;
        check_range(
            "spreading_factor",
            self.spreading_factor,
            &SPREADING_FACTOR_RANGE,
        )?;
        check_range("bandwidth", self.bandwidth, &BANDWIDTH_RANGE)?;
        check_range("coding_rate", self.coding_rate, &CODING_RATE_RANGE)?;
        check_range("preamble_length", self.preamble_length, &PREAMBLE_RANGE)?;
        check_range("tx_power", self.tx_power, &TX_POWER_RANGE)?;
        Ok(())
    }
}

fn check_range<T>(name: &str, value: T, range: &RangeInclusive<T>) -> Result<()>
where
    T: PartialOrd + fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "{name} {value} outside {}..={}",
            range.start(),
            range.end()
        )))
    }
}

// ---------------------------------------------------------------------------
// TransferMode
// ---------------------------------------------------------------------------

/// P2P sub-mode. The module is half-duplex: it can listen or transmit, never
/// both at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferMode {
    Receive,
    Transmit,
}

impl TransferMode {
    /// Numeric code used by `at+set_config=lorap2p:transfer_mode:<n>`.
    pub fn code(self) -> u8 {
        match self {
            TransferMode::Receive => 1,
            TransferMode::Transmit => 2,
        }
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMode::Receive => f.write_str("receive"),
            TransferMode::Transmit => f.write_str("transmit"),
        }
    }
}

// ---------------------------------------------------------------------------
// AtCommand / AtResponse
// ---------------------------------------------------------------------------

/// How a command's response window decides it has succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// A line starting with the expected prefix completes the exchange.
    #[default]
    Prefix,
    /// Work-mode changes and restarts: the module re-initialises and prints
    /// `Initialization OK` before (or instead of) the mode confirmation, so
    /// either line completes the exchange.
    ModeChange,
}

/// Default response window for an AT command.
pub const DEFAULT_AT_TIMEOUT: Duration = Duration::from_secs(2);

/// A single outbound AT line and how to judge its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtCommand {
    /// Command text without the line terminator, e.g. `at+version`.
    pub text: String,
    /// Prefix of the success line, e.g. `OK`.
    pub expected_prefix: String,
    /// Upper bound on the response window.
    pub timeout: Duration,
    /// Suppress normal-path logging. Error lines are always logged.
    pub silent: bool,
    pub completion: Completion,
}

impl AtCommand {
    /// A command expecting an `OK`-prefixed reply within the default window.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            expected_prefix: "OK".to_string(),
            timeout: DEFAULT_AT_TIMEOUT,
            silent: false,
            completion: Completion::Prefix,
        }
    }

    pub fn expect(mut self, prefix: impl Into<String>) -> Self {
        self.expected_prefix = prefix.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn completion(mut self, completion: Completion) -> Self {
        self.completion = completion;
        self
    }
}

/// Lines collected during one command's response window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtResponse {
    /// Every completed (trimmed, non-empty) line, in arrival order.
    pub lines: Vec<String>,
    /// Whether the command's completion rule was satisfied.
    pub matched: bool,
    /// The `ERROR:` line that ended the window early, if any.
    pub error_line: Option<String>,
}

impl AtResponse {
    /// Convert an unmatched response into the matching error.
    ///
    /// An explicit error line becomes [`Error::Radio`]; silence or unexpected
    /// output becomes [`Error::Timeout`].
    pub fn into_result(self) -> Result<AtResponse> {
        if self.matched {
            return Ok(self);
        }
        match self.error_line {
            Some(line) => Err(Error::Radio(line)),
            None => Err(Error::Timeout),
        }
    }
}

// ---------------------------------------------------------------------------
// InboundFrame
// ---------------------------------------------------------------------------

/// One asynchronous receive notification: `at+recv=<rssi>,<snr>[,<len>]:<hex>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Received signal strength in dBm.
    pub rssi: i32,
    /// Signal-to-noise ratio in dB.
    pub snr: i32,
    /// Payload length in bytes, when the firmware reports it.
    pub len: Option<usize>,
    /// Hex-encoded payload, exactly as received.
    pub payload_hex: String,
}
