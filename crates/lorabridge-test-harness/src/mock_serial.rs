//! Mock transport for deterministic testing of the AT protocol engine.
//!
//! [`MockTransport`] implements the [`Transport`] trait with pre-loaded
//! request/response pairs plus a queue of unsolicited inbound data (the
//! `at+recv=` notifications a real module pushes at any time).
//!
//! # Example
//!
//! ```
//! use lorabridge_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! mock.expect(b"at+version\r\n", b"OK V3.0.0.14.H\r\n");
//! mock.push_inbound(b"at+recv=-40,7,2:4142\r\n");
//! let sent = mock.sent_log();
//! assert!(sent.is_empty());
//!
//! // Keep a handle to inject data after the mock has been moved.
//! let inbound = mock.inbound();
//! inbound.push(b"at+recv=-41,6,2:4142\r\n");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lorabridge_core::error::{Error, Result};
use lorabridge_core::transport::Transport;

/// A pre-loaded request/response pair for the mock transport.
#[derive(Debug, Clone)]
struct Expectation {
    /// The exact bytes we expect to be sent.
    request: Vec<u8>,
    /// The bytes to return when the matching request is received.
    response: Vec<u8>,
}

/// Unsolicited input, delivered whenever no response is pending.
#[derive(Debug, Clone)]
enum Inbound {
    Data(Vec<u8>),
    /// Simulates the adapter disappearing mid-read.
    Fault,
}

/// Shared handle onto the mock's unsolicited input queue.
///
/// Lets a test feed frames or a link failure to a transport that already
/// belongs to an IO task.
#[derive(Debug, Clone, Default)]
pub struct InboundQueue(Arc<Mutex<VecDeque<Inbound>>>);

impl InboundQueue {
    /// Queue unsolicited bytes, delivered as one read.
    pub fn push(&self, data: &[u8]) {
        if let Ok(mut q) = self.0.lock() {
            q.push_back(Inbound::Data(data.to_vec()));
        }
    }

    /// Queue a link failure: the read that reaches it returns
    /// [`Error::ConnectionLost`].
    pub fn push_link_fault(&self) {
        if let Ok(mut q) = self.0.lock() {
            q.push_back(Inbound::Fault);
        }
    }

    fn pop(&self) -> Option<Inbound> {
        self.0.lock().ok().and_then(|mut q| q.pop_front())
    }

    fn push_front(&self, item: Inbound) {
        if let Ok(mut q) = self.0.lock() {
            q.push_front(item);
        }
    }
}

/// Shared record of every `send()` call.
///
/// Cloned out of the mock before it is boxed and moved into an IO task, so
/// tests can still inspect what reached the wire.
#[derive(Debug, Clone, Default)]
pub struct SentLog(Arc<Mutex<Vec<Vec<u8>>>>);

impl SentLog {
    fn push(&self, data: &[u8]) {
        if let Ok(mut log) = self.0.lock() {
            log.push(data.to_vec());
        }
    }

    /// Raw bytes of every send, in order.
    pub fn entries(&self) -> Vec<Vec<u8>> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Every send as text with the trailing line terminator removed.
    pub fn lines(&self) -> Vec<String> {
        self.entries()
            .iter()
            .map(|e| String::from_utf8_lossy(e).trim_end().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|log| log.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A mock [`Transport`] for testing the protocol engine without hardware.
///
/// Expectations are consumed in order. When `send()` is called, the sent
/// data is recorded and matched against the next expectation. The
/// corresponding response is then returned by the following `receive()`
/// calls. Once it is exhausted, `receive()` drains the unsolicited queue,
/// and times out immediately when that is empty too.
#[derive(Debug)]
pub struct MockTransport {
    expectations: VecDeque<Expectation>,
    pending_response: Option<Vec<u8>>,
    response_cursor: usize,
    inbound: InboundQueue,
    connected: bool,
    sent_log: SentLog,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            pending_response: None,
            response_cursor: 0,
            inbound: InboundQueue::default(),
            connected: true,
            sent_log: SentLog::default(),
        }
    }

    /// Add an expected request/response pair.
    ///
    /// When `send()` is called with data matching `request`, the subsequent
    /// `receive()` calls will return `response`.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Queue unsolicited bytes, returned by `receive()` when no response is
    /// pending. Each call is delivered as one read.
    pub fn push_inbound(&mut self, data: &[u8]) {
        self.inbound.push(data);
    }

    /// Queue a link failure: the read that reaches it returns
    /// [`Error::ConnectionLost`].
    pub fn push_link_fault(&mut self) {
        self.inbound.push_link_fault();
    }

    /// Handle onto the unsolicited input queue, usable after the mock has
    /// been moved into an IO task.
    pub fn inbound(&self) -> InboundQueue {
        self.inbound.clone()
    }

    /// Handle onto the record of everything sent through this transport.
    pub fn sent_log(&self) -> SentLog {
        self.sent_log.clone()
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// Set the connected state of the mock transport.
    ///
    /// When set to `false`, subsequent `send()` and `receive()` calls will
    /// return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        self.sent_log.push(data);

        let Some(expectation) = self.expectations.pop_front() else {
            return Err(Error::Protocol(format!(
                "no more expectations in mock transport (sent {:?})",
                String::from_utf8_lossy(data)
            )));
        };
        if data != expectation.request.as_slice() {
            return Err(Error::Protocol(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            )));
        }
        self.pending_response = Some(expectation.response);
        self.response_cursor = 0;
        Ok(())
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        if let Some(ref response) = self.pending_response {
            let remaining = &response[self.response_cursor..];
            if !remaining.is_empty() {
                let n = remaining.len().min(buf.len());
                buf[..n].copy_from_slice(&remaining[..n]);
                self.response_cursor += n;
                if self.response_cursor >= response.len() {
                    self.pending_response = None;
                    self.response_cursor = 0;
                }
                return Ok(n);
            }
            self.pending_response = None;
            self.response_cursor = 0;
            return Err(Error::Timeout);
        }

        match self.inbound.pop() {
            Some(Inbound::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    self.inbound.push_front(Inbound::Data(data.split_off(n)));
                }
                Ok(n)
            }
            Some(Inbound::Fault) => {
                self.connected = false;
                Err(Error::ConnectionLost)
            }
            None => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.connected = false;
        self.pending_response = None;
        self.response_cursor = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
