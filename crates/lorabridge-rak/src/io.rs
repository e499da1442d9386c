//! IO task types and implementation for the RAK AT driver.
//!
//! One tokio task owns the transport exclusively. Every stream operation
//! (an AT exchange, a full transmit bracket, shutdown) is a [`Request`]
//! submitted over an `mpsc` channel and answered on a `oneshot`. Between
//! requests the task polls the stream for unsolicited `at+recv=` frames and
//! broadcasts them as [`RadioEvent`]s. There is never more than one
//! operation in flight on the link.
//!
//! A transmit bracket (switch to transmit, send, switch back to receive) is a
//! single request, so the idle reader cannot interleave with it.

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use lorabridge_core::error::{Error, Result};
use lorabridge_core::events::RadioEvent;
use lorabridge_core::transport::Transport;
use lorabridge_core::types::{AtCommand, AtResponse, TransferMode};

use crate::commands;
use crate::protocol::{self, DecodeResult, Progress, ResponseCollector};
use crate::timing::Timing;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A request sent to the IO task.
pub enum Request {
    /// One AT exchange.
    Command {
        command: AtCommand,
        reply: oneshot::Sender<Result<AtResponse>>,
    },
    /// A complete transmit bracket for an already hex-encoded payload.
    Transmit {
        payload_hex: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Graceful shutdown; returns the transport so the owner can close it.
    Shutdown {
        reply: oneshot::Sender<Box<dyn Transport>>,
    },
}

/// Cloneable sender side of the IO task.
///
/// This is the one send path into the radio. The command bridge holds a
/// clone; bring-up uses another. Both are serialized by the IO task.
#[derive(Clone)]
pub struct RakHandle {
    cmd_tx: mpsc::Sender<Request>,
    timing: Timing,
}

/// Slack added to every reply wait on top of the command's own window.
const REPLY_SLACK: Duration = Duration::from_millis(500);

impl RakHandle {
    /// Run one AT exchange and return the collected response.
    ///
    /// `Ok` is returned whether or not the completion rule matched; use
    /// [`AtResponse::into_result`] to turn a miss into an error. `Err` means
    /// the link itself failed or the IO task is gone.
    pub async fn execute(&self, command: AtCommand) -> Result<AtResponse> {
        let wait = command.timeout + REPLY_SLACK;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Request::Command {
                command,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;

        match tokio::time::timeout(wait, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::NotConnected),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Switch the P2P sub-mode.
    pub async fn set_mode(&self, mode: TransferMode) -> Result<()> {
        self.execute(commands::cmd_set_transfer_mode(
            mode,
            self.timing.mode_switch_timeout,
        ))
        .await?
        .into_result()
        .map(|_| ())
    }

    /// Transmit a hex payload inside a transmit/receive bracket.
    ///
    /// Oversized or non-hex payloads are rejected here, before the IO task
    /// touches the radio's mode.
    pub async fn transmit(&self, payload_hex: &str) -> Result<()> {
        validate_payload_hex(payload_hex)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Request::Transmit {
                payload_hex: payload_hex.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;

        let wait = self.timing.transmit_budget() + REPLY_SLACK;
        match tokio::time::timeout(wait, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::NotConnected),
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Whether the IO task is still accepting requests.
    pub fn is_connected(&self) -> bool {
        !self.cmd_tx.is_closed()
    }
}

fn validate_payload_hex(payload_hex: &str) -> Result<()> {
    if payload_hex.is_empty() {
        return Err(Error::Codec("empty payload".into()));
    }
    if payload_hex.len() > commands::MAX_PAYLOAD_HEX_CHARS {
        return Err(Error::Codec(format!(
            "hex payload is {} chars, limit is {}",
            payload_hex.len(),
            commands::MAX_PAYLOAD_HEX_CHARS
        )));
    }
    if payload_hex.len() % 2 != 0 || !payload_hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::Codec("payload is not an even-length hex string".into()));
    }
    Ok(())
}

/// Handle to the IO task. Stored inside [`crate::RakRadio`].
pub struct RakIo {
    handle: RakHandle,
    /// Cancellation token for stopping the task without recovering the
    /// transport. The task closes the transport itself on this path.
    pub cancel: CancellationToken,
    /// Join handle for the IO task.
    pub task: JoinHandle<()>,
}

impl RakIo {
    pub fn handle(&self) -> &RakHandle {
        &self.handle
    }

    /// Shut down the IO task and recover the transport.
    ///
    /// Waits for any request already in progress to finish first; there is
    /// no mid-exchange cancellation.
    pub async fn shutdown(self) -> Result<Box<dyn Transport>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .handle
            .cmd_tx
            .send(Request::Shutdown { reply: reply_tx })
            .await;
        let transport = reply_rx.await.map_err(|_| Error::NotConnected)?;
        let _ = self.task.await;
        Ok(transport)
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Spawn the IO task. Returns the handle for sending requests.
pub fn spawn_io_task(
    transport: Box<dyn Transport>,
    timing: Timing,
    event_tx: broadcast::Sender<RadioEvent>,
) -> RakIo {
    let (cmd_tx, cmd_rx) = mpsc::channel::<Request>(32);
    let cancel = CancellationToken::new();

    let task = tokio::spawn(io_loop(
        transport,
        timing,
        event_tx,
        cmd_rx,
        cancel.clone(),
    ));

    RakIo {
        handle: RakHandle { cmd_tx, timing },
        cancel,
        task,
    }
}

// ---------------------------------------------------------------------------
// IO Loop
// ---------------------------------------------------------------------------

/// Maximum buffer size before reset to prevent unbounded growth.
/// The longest legitimate line is a receive notification carrying a full
/// payload, well under 512 bytes.
const MAX_BUF: usize = 4096;

/// How long one idle read waits for unsolicited data.
const IDLE_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Pause after an idle read that produced nothing.
const IDLE_SLEEP: Duration = Duration::from_millis(50);

/// The main IO loop. Runs as a spawned Tokio task.
///
/// Uses `tokio::select! { biased; }` to prioritize:
/// 1. Cancellation
/// 2. Request dispatch
/// 3. Idle unsolicited frame reading
async fn io_loop(
    mut transport: Box<dyn Transport>,
    timing: Timing,
    event_tx: broadcast::Sender<RadioEvent>,
    mut cmd_rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
) {
    let mut idle_buf = Vec::new();

    let fault = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("radio IO task cancelled");
                break None;
            }

            req = cmd_rx.recv() => {
                match req {
                    Some(Request::Shutdown { reply }) => {
                        debug!("radio IO task shutdown requested");
                        let _ = reply.send(transport);
                        return;
                    }
                    Some(req) => {
                        if let Some(reason) = handle_request(
                            req, &mut *transport, &timing, &event_tx, &mut idle_buf,
                        ).await {
                            break Some(reason);
                        }
                    }
                    None => {
                        debug!("request channel closed, exiting radio IO task");
                        break None;
                    }
                }
            }

            result = read_idle(&mut *transport, &mut idle_buf, &event_tx) => {
                if let Err(e) = result {
                    break Some(e.to_string());
                }
            }
        }
    };

    if let Some(reason) = fault {
        error!(reason = %reason, "radio link failed, stopping IO task");
        let _ = event_tx.send(RadioEvent::LinkLost { reason });
    }
    if let Err(e) = transport.close().await {
        warn!(error = %e, "failed to close transport");
    }
}

/// Dispatch a single request on the transport.
///
/// Returns the failure description if the request hit a link fault, which
/// ends the IO task.
async fn handle_request(
    req: Request,
    transport: &mut dyn Transport,
    timing: &Timing,
    event_tx: &broadcast::Sender<RadioEvent>,
    idle_buf: &mut Vec<u8>,
) -> Option<String> {
    match req {
        Request::Command { command, reply } => {
            let result = execute_at(transport, &command, event_tx, idle_buf).await;
            let fault = link_fault(&result);
            let _ = reply.send(result);
            fault
        }
        Request::Transmit { payload_hex, reply } => {
            let result =
                execute_transmit(transport, &payload_hex, timing, event_tx, idle_buf).await;
            let fault = link_fault(&result);
            let _ = reply.send(result);
            fault
        }
        Request::Shutdown { .. } => unreachable!("Shutdown handled in io_loop"),
    }
}

fn link_fault<T>(result: &Result<T>) -> Option<String> {
    match result {
        Err(e) if e.is_link_fault() => Some(e.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Command execution
// ---------------------------------------------------------------------------

/// Run one AT exchange on the transport.
///
/// Flushes stale input, writes the command line, then assembles response
/// lines until the completion rule is satisfied, an `ERROR:` line arrives,
/// or the window closes. Receive notifications arriving inside the window
/// are dispatched as frames rather than recorded as response lines. If the
/// window closes with no terminated match, an unterminated trailing line is
/// checked against the expected prefix.
///
/// Returns `Err` only for link failures.
async fn execute_at(
    transport: &mut dyn Transport,
    command: &AtCommand,
    event_tx: &broadcast::Sender<RadioEvent>,
    idle_buf: &mut Vec<u8>,
) -> Result<AtResponse> {
    flush_stale_input(transport, idle_buf, event_tx).await?;

    if command.silent {
        trace!(command = %command.text, "gateway -> radio");
    } else {
        debug!(command = %command.text, "gateway -> radio");
    }
    transport
        .send(&protocol::encode_command(&command.text))
        .await?;

    let deadline = tokio::time::Instant::now() + command.timeout;
    let mut collector = ResponseCollector::new(command);
    let mut recv_buf = [0u8; 256];
    let mut line_buf: Vec<u8> = Vec::new();

    'window: loop {
        let now = tokio::time::Instant::now();
        if now >= deadline {
            break;
        }

        match transport.receive(&mut recv_buf, deadline - now).await {
            Ok(n) => {
                line_buf.extend_from_slice(&recv_buf[..n]);

                if line_buf.len() > MAX_BUF {
                    warn!(
                        len = line_buf.len(),
                        command = %command.text,
                        "response buffer overflow, abandoning exchange"
                    );
                    line_buf.clear();
                    break;
                }

                loop {
                    match protocol::decode_line(&line_buf) {
                        DecodeResult::Line { text, consumed } => {
                            line_buf.drain(..consumed);
                            if text.is_empty() {
                                continue;
                            }
                            if protocol::is_recv_line(&text) {
                                dispatch_frame(&text, event_tx);
                                continue;
                            }
                            log_response_line(command, &text);
                            if collector.feed_line(&text) == Progress::Done {
                                break 'window;
                            }
                        }
                        DecodeResult::Incomplete => break,
                    }
                }
            }
            Err(Error::Timeout) => break,
            Err(e) => return Err(e),
        }
    }

    if !collector.is_settled() {
        let partial = String::from_utf8_lossy(&line_buf).trim().to_string();
        if collector.try_partial(&partial) {
            log_response_line(command, &partial);
            line_buf.clear();
        }
    }
    // Whatever followed the reply belongs to the idle stream. Complete
    // lines in it are handled now; no further read may ever arrive.
    idle_buf.extend_from_slice(&line_buf);
    process_idle_lines(idle_buf, event_tx);

    let response = collector.into_response();
    if !response.matched {
        if let Some(ref line) = response.error_line {
            warn!(command = %command.text, error = %line, "radio reported error");
        } else if !command.silent {
            warn!(
                command = %command.text,
                expected = %command.expected_prefix,
                lines = ?response.lines,
                "no matching response before timeout"
            );
        }
    }
    Ok(response)
}

fn log_response_line(command: &AtCommand, line: &str) {
    if line.contains(protocol::ERROR_MARKER) {
        warn!(command = %command.text, line, "radio -> gateway");
    } else if command.silent {
        trace!(line, "radio -> gateway");
    } else {
        debug!(line, "radio -> gateway");
    }
}

/// Execute a transmit bracket: transmit mode, send, receive mode.
///
/// Receive mode is restored on every exit path, including a failed switch
/// into transmit mode and a failed send. A radio left in transmit mode
/// hears nothing until the next send.
async fn execute_transmit(
    transport: &mut dyn Transport,
    payload_hex: &str,
    timing: &Timing,
    event_tx: &broadcast::Sender<RadioEvent>,
    idle_buf: &mut Vec<u8>,
) -> Result<()> {
    tokio::time::sleep(timing.before_mode_switch).await;
    let to_transmit = execute_at(
        transport,
        &commands::cmd_set_transfer_mode(TransferMode::Transmit, timing.mode_switch_timeout),
        event_tx,
        idle_buf,
    )
    .await;

    let sent = match to_transmit {
        Ok(resp) if resp.matched => {
            let result = execute_at(
                transport,
                &commands::cmd_send_p2p(payload_hex, timing.send_timeout),
                event_tx,
                idle_buf,
            )
            .await
            .and_then(AtResponse::into_result)
            .map(|_| ());
            tokio::time::sleep(timing.after_send).await;
            result
        }
        Ok(resp) => {
            error!("failed to enter transmit mode, aborting send");
            resp.into_result().map(|_| ())
        }
        Err(e) => Err(e),
    };

    tokio::time::sleep(timing.before_mode_switch).await;
    let restored = execute_at(
        transport,
        &commands::cmd_set_transfer_mode(TransferMode::Receive, timing.mode_switch_timeout),
        event_tx,
        idle_buf,
    )
    .await;
    match restored {
        Ok(resp) if resp.matched => {}
        Ok(_) => warn!("failed to restore receive mode after send"),
        Err(e) => {
            warn!(error = %e, "failed to restore receive mode after send");
            if sent.is_ok() {
                return Err(e);
            }
        }
    }

    sent
}

// ---------------------------------------------------------------------------
// Idle frame processing
// ---------------------------------------------------------------------------

/// One idle poll of the stream.
///
/// Complete lines are classified immediately; a partial line stays in
/// `idle_buf` for the next poll. Returns `Err` only for link failures.
async fn read_idle(
    transport: &mut dyn Transport,
    idle_buf: &mut Vec<u8>,
    event_tx: &broadcast::Sender<RadioEvent>,
) -> Result<()> {
    let mut buf = [0u8; 256];
    match transport.receive(&mut buf, IDLE_READ_TIMEOUT).await {
        Ok(n) if n > 0 => {
            idle_buf.extend_from_slice(&buf[..n]);
            if idle_buf.len() > MAX_BUF {
                warn!(len = idle_buf.len(), "idle buffer overflow, resetting");
                idle_buf.clear();
                return Ok(());
            }
            process_idle_lines(idle_buf, event_tx);
            Ok(())
        }
        Ok(_) | Err(Error::Timeout) => {
            tokio::time::sleep(IDLE_SLEEP).await;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Drain whatever the module sent since the last operation so it cannot be
/// mistaken for this command's reply. Receive notifications in it are still
/// dispatched; everything else is discarded.
async fn flush_stale_input(
    transport: &mut dyn Transport,
    idle_buf: &mut Vec<u8>,
    event_tx: &broadcast::Sender<RadioEvent>,
) -> Result<()> {
    let mut buf = [0u8; 256];
    while idle_buf.len() <= MAX_BUF {
        match transport.receive(&mut buf, Duration::ZERO).await {
            Ok(0) | Err(Error::Timeout) => break,
            Ok(n) => idle_buf.extend_from_slice(&buf[..n]),
            Err(e) => return Err(e),
        }
    }

    process_idle_lines(idle_buf, event_tx);
    if !idle_buf.is_empty() {
        debug!(bytes = idle_buf.len(), "discarding stale partial input");
        idle_buf.clear();
    }
    Ok(())
}

/// Classify every complete line in the idle buffer.
///
/// Receive notifications become frame events; anything else the module
/// prints unprompted is logged and discarded.
fn process_idle_lines(buf: &mut Vec<u8>, event_tx: &broadcast::Sender<RadioEvent>) {
    while let DecodeResult::Line { text, consumed } = protocol::decode_line(buf) {
        buf.drain(..consumed);
        if text.is_empty() {
            continue;
        }
        if protocol::is_recv_line(&text) {
            dispatch_frame(&text, event_tx);
        } else {
            debug!(line = %text, "ignoring unsolicited line");
        }
    }
}

/// Parse a receive notification and broadcast it.
///
/// A malformed notification is logged and dropped; it never ends the loop.
fn dispatch_frame(line: &str, event_tx: &broadcast::Sender<RadioEvent>) {
    match protocol::parse_recv_line(line) {
        Ok(frame) => {
            debug!(rssi = frame.rssi, snr = frame.snr, "inbound frame");
            if event_tx.send(RadioEvent::FrameReceived(frame)).is_err() {
                debug!("no frame subscribers, dropping frame");
            }
        }
        Err(e) => warn!(line, error = %e, "malformed receive notification, dropping"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
