//! RAK AT line protocol: framing, response matching, and frame parsing.
//!
//! The module speaks plain ASCII lines terminated by CR+LF. Requests look like
//! `at+<name>=<args>`; a success reply usually starts with `OK`, a failure
//! contains `ERROR:`. Inbound radio frames arrive unsolicited at any time as
//! `at+recv=<rssi>,<snr>[,<len>]:<hex>`.
//!
//! Everything in this module is pure. The IO task in [`crate::io`] feeds it
//! bytes and acts on the results.

use bytes::{BufMut, BytesMut};

use lorabridge_core::error::{Error, Result};
use lorabridge_core::types::{AtCommand, AtResponse, Completion, InboundFrame};

/// Line terminator appended to every outbound command.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Prefix of an asynchronous receive notification.
pub const RECV_MARKER: &str = "at+recv=";

/// Substring marking a module-reported failure.
pub const ERROR_MARKER: &str = "ERROR:";

/// Printed by the module after a restart or work-mode change.
pub const INIT_OK: &str = "Initialization OK";

/// Plain prefix-matched exchanges stop collecting after this many lines.
pub const MAX_RESPONSE_LINES: usize = 10;

/// Result of attempting to decode one line from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete line was decoded.
    Line {
        /// Line content with surrounding whitespace and CR/LF trimmed.
        /// May be empty for blank lines.
        text: String,
        /// Number of bytes consumed from the input buffer.
        consumed: usize,
    },

    /// The buffer does not yet contain a line feed. More data is needed.
    Incomplete,
}

/// Encode a command line ready for transmission.
///
/// ```
/// use lorabridge_rak::protocol::encode_command;
///
/// assert_eq!(encode_command("at+version"), b"at+version\r\n");
/// ```
pub fn encode_command(text: &str) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(text.len() + LINE_TERMINATOR.len());
    buf.put_slice(text.as_bytes());
    buf.put_slice(LINE_TERMINATOR);
    buf.to_vec()
}

/// Decode the first LF-terminated line from `buf`.
///
/// Non-UTF-8 bytes are replaced rather than rejected; the module only emits
/// ASCII, so anything else is line noise that the matcher will ignore.
pub fn decode_line(buf: &[u8]) -> DecodeResult {
    let Some(lf) = buf.iter().position(|&b| b == b'\n') else {
        return DecodeResult::Incomplete;
    };
    let text = String::from_utf8_lossy(&buf[..lf]).trim().to_string();
    DecodeResult::Line {
        text,
        consumed: lf + 1,
    }
}

/// Returns `true` if the line is an asynchronous receive notification.
pub fn is_recv_line(line: &str) -> bool {
    line.starts_with(RECV_MARKER)
}

/// Parse `at+recv=<rssi>,<snr>[,<len>]:<hex>` into an [`InboundFrame`].
///
/// RSSI and SNR are required and must be integers. Some firmware revisions
/// append the payload length as a third field; it is accepted when numeric.
/// The hex payload itself is not validated here.
pub fn parse_recv_line(line: &str) -> Result<InboundFrame> {
    let body = line
        .strip_prefix(RECV_MARKER)
        .ok_or_else(|| Error::Protocol(format!("not a receive notification: {line}")))?;

    let (params, payload) = body
        .split_once(':')
        .ok_or_else(|| Error::Protocol("receive notification has no ':' separator".into()))?;

    let fields: Vec<&str> = params.split(',').map(str::trim).collect();
    if !(2..=3).contains(&fields.len()) {
        return Err(Error::Protocol(format!(
            "expected rssi,snr[,len] but found {} field(s)",
            fields.len()
        )));
    }

    let rssi = fields[0]
        .parse::<i32>()
        .map_err(|_| Error::Protocol(format!("non-numeric rssi {:?}", fields[0])))?;
    let snr = fields[1]
        .parse::<i32>()
        .map_err(|_| Error::Protocol(format!("non-numeric snr {:?}", fields[1])))?;
    let len = match fields.get(2) {
        Some(raw) => Some(
            raw.parse::<usize>()
                .map_err(|_| Error::Protocol(format!("non-numeric length {raw:?}")))?,
        ),
        None => None,
    };

    Ok(InboundFrame {
        rssi,
        snr,
        len,
        payload_hex: payload.trim().to_string(),
    })
}

// ---------------------------------------------------------------------------
// Response matching
// ---------------------------------------------------------------------------

/// Whether a response window should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Continue,
    Done,
}

/// Accumulates response lines for one command and applies its completion
/// rule.
///
/// An `ERROR:` line always wins: it clears any earlier match and ends the
/// window immediately. Hitting the line cap also ends the window but leaves
/// the response unsettled, so the trailing partial line is still checked.
#[derive(Debug)]
pub struct ResponseCollector<'a> {
    command: &'a AtCommand,
    response: AtResponse,
    settled: bool,
    capped: bool,
}

impl<'a> ResponseCollector<'a> {
    pub fn new(command: &'a AtCommand) -> Self {
        Self {
            command,
            response: AtResponse::default(),
            settled: false,
            capped: false,
        }
    }

    /// Record one completed, non-empty line.
    pub fn feed_line(&mut self, line: &str) -> Progress {
        if self.settled || self.capped {
            return Progress::Done;
        }
        self.response.lines.push(line.to_string());

        if line.contains(ERROR_MARKER) {
            self.response.matched = false;
            self.response.error_line = Some(line.to_string());
            self.settled = true;
            return Progress::Done;
        }

        if line.starts_with(&self.command.expected_prefix) {
            self.response.matched = true;
        }
        if self.command.completion == Completion::ModeChange && line.contains(INIT_OK) {
            self.response.matched = true;
        }

        if self.response.matched {
            self.settled = true;
            return Progress::Done;
        }
        if self.command.completion == Completion::Prefix
            && self.response.lines.len() >= MAX_RESPONSE_LINES
        {
            self.capped = true;
            return Progress::Done;
        }
        Progress::Continue
    }

    /// Window closed without a terminated match: accept an unterminated
    /// trailing line that carries the expected prefix.
    ///
    /// Returns `true` if the partial line was consumed as the match.
    pub fn try_partial(&mut self, partial: &str) -> bool {
        if self.response.matched
            || self.response.error_line.is_some()
            || partial.is_empty()
            || !partial.starts_with(&self.command.expected_prefix)
        {
            return false;
        }
        self.response.lines.push(partial.to_string());
        self.response.matched = true;
        self.settled = true;
        true
    }

    /// A match or an `ERROR:` line has decided the response.
    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn into_response(self) -> AtResponse {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // decode_line
    // -----------------------------------------------------------------------

    #[test]
    fn decode_empty_buffer() {
        assert_eq!(decode_line(b""), DecodeResult::Incomplete);
    }

    #[test]
    fn decode_no_terminator() {
        assert_eq!(decode_line(b"OK V3.0"), DecodeResult::Incomplete);
    }

    #[test]
    fn decode_crlf_line() {
        assert_eq!(
            decode_line(b"OK V3.0.0.14.H\r\n"),
            DecodeResult::Line {
                text: "OK V3.0.0.14.H".into(),
                consumed: 16,
            }
        );
    }

    #[test]
    fn decode_bare_lf_line() {
        assert_eq!(
            decode_line(b"OK\n"),
            DecodeResult::Line {
                text: "OK".into(),
                consumed: 3,
            }
        );
    }

    #[test]
    fn decode_blank_line() {
        assert_eq!(
            decode_line(b"\r\nOK\r\n"),
            DecodeResult::Line {
                text: "".into(),
                consumed: 2,
            }
        );
    }

    #[test]
    fn decode_complete_plus_incomplete() {
        assert_eq!(
            decode_line(b"OK\r\nat+recv="),
            DecodeResult::Line {
                text: "OK".into(),
                consumed: 4,
            }
        );
    }

    #[test]
    fn encode_appends_crlf() {
        assert_eq!(
            encode_command("at+set_config=lorap2p:transfer_mode:1"),
            b"at+set_config=lorap2p:transfer_mode:1\r\n"
        );
    }

    // -----------------------------------------------------------------------
    // parse_recv_line
    // -----------------------------------------------------------------------

    #[test]
    fn parse_recv_two_fields() {
        let frame = parse_recv_line("at+recv=-45,9:7B7D").unwrap();
        assert_eq!(frame.rssi, -45);
        assert_eq!(frame.snr, 9);
        assert_eq!(frame.len, None);
        assert_eq!(frame.payload_hex, "7B7D");
    }

    #[test]
    fn parse_recv_with_length_field() {
        let frame = parse_recv_line("at+recv=-112,-3,2:7B7D").unwrap();
        assert_eq!(frame.rssi, -112);
        assert_eq!(frame.snr, -3);
        assert_eq!(frame.len, Some(2));
    }

    #[test]
    fn parse_recv_missing_colon() {
        let err = parse_recv_line("at+recv=-45,9").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn parse_recv_non_numeric_rssi() {
        let err = parse_recv_line("at+recv=abc,9:7B7D").unwrap_err();
        assert!(err.to_string().contains("rssi"));
    }

    #[test]
    fn parse_recv_wrong_field_count() {
        assert!(parse_recv_line("at+recv=-45:7B7D").is_err());
        assert!(parse_recv_line("at+recv=-45,9,2,1:7B7D").is_err());
    }

    #[test]
    fn parse_recv_wrong_marker() {
        assert!(parse_recv_line("OK").is_err());
    }

    // -----------------------------------------------------------------------
    // ResponseCollector
    // -----------------------------------------------------------------------

    #[test]
    fn collector_prefix_match_completes() {
        let cmd = AtCommand::new("at+version").expect("OK V");
        let mut c = ResponseCollector::new(&cmd);
        assert_eq!(c.feed_line("OK V3.0.0.14.H"), Progress::Done);
        let resp = c.into_response();
        assert!(resp.matched);
        assert_eq!(resp.lines, vec!["OK V3.0.0.14.H"]);
    }

    #[test]
    fn collector_skips_unrelated_lines() {
        let cmd = AtCommand::new("at+set_config=lorap2p:transfer_mode:1");
        let mut c = ResponseCollector::new(&cmd);
        assert_eq!(c.feed_line("UART1 received"), Progress::Continue);
        assert_eq!(c.feed_line("OK"), Progress::Done);
        assert!(c.into_response().matched);
    }

    #[test]
    fn collector_error_overrides_match() {
        let cmd = AtCommand::new("at+send=lorap2p:41");
        let mut c = ResponseCollector::new(&cmd);
        assert_eq!(c.feed_line("ERROR: 2"), Progress::Done);
        let resp = c.into_response();
        assert!(!resp.matched);
        assert_eq!(resp.error_line.as_deref(), Some("ERROR: 2"));
    }

    #[test]
    fn collector_mode_change_accepts_init_ok() {
        let cmd = AtCommand::new("at+set_config=lora:work_mode:1")
            .expect("Current work_mode:P2P")
            .completion(Completion::ModeChange);
        let mut c = ResponseCollector::new(&cmd);
        assert_eq!(c.feed_line("RAK4270 version:3.0.0.14"), Progress::Continue);
        assert_eq!(c.feed_line("Initialization OK"), Progress::Done);
        assert!(c.into_response().matched);
    }

    #[test]
    fn collector_prefix_rule_ignores_init_ok() {
        let cmd = AtCommand::new("at+set_config=lorap2p:transfer_mode:2");
        let mut c = ResponseCollector::new(&cmd);
        assert_eq!(c.feed_line("Initialization OK"), Progress::Continue);
        assert!(!c.into_response().matched);
    }

    #[test]
    fn collector_caps_line_count() {
        let cmd = AtCommand::new("at+help");
        let mut c = ResponseCollector::new(&cmd);
        for i in 0..MAX_RESPONSE_LINES - 1 {
            assert_eq!(c.feed_line(&format!("line {i}")), Progress::Continue);
        }
        assert_eq!(c.feed_line("last"), Progress::Done);
        assert!(!c.is_settled());
        assert!(!c.into_response().matched);
    }

    #[test]
    fn collector_partial_fallback_after_line_cap() {
        let cmd = AtCommand::new("at+set_config=lorap2p:transfer_mode:1");
        let mut c = ResponseCollector::new(&cmd);
        for i in 0..MAX_RESPONSE_LINES {
            c.feed_line(&format!("noise {i}"));
        }
        assert_eq!(c.feed_line("more noise"), Progress::Done);
        assert!(c.try_partial("OK"));
        assert!(c.is_settled());
        let resp = c.into_response();
        assert!(resp.matched);
        assert_eq!(resp.lines.len(), MAX_RESPONSE_LINES + 1);
    }

    #[test]
    fn collector_partial_fallback() {
        let cmd = AtCommand::new("at+set_config=lorap2p:transfer_mode:1");
        let mut c = ResponseCollector::new(&cmd);
        assert!(c.try_partial("OK"));
        assert!(c.into_response().matched);
    }

    #[test]
    fn collector_partial_ignored_after_error() {
        let cmd = AtCommand::new("at+set_config=lorap2p:transfer_mode:1");
        let mut c = ResponseCollector::new(&cmd);
        c.feed_line("ERROR: 1");
        assert!(!c.try_partial("OK"));
        assert!(!c.into_response().matched);
    }
}
