//! Asynchronous radio event types.
//!
//! Events are emitted by the radio IO task through a
//! [`tokio::sync::broadcast`] channel. The frame listener subscribes to them
//! to republish inbound telemetry; the process owner watches for
//! [`RadioEvent::LinkLost`] to decide on restart.

use crate::types::InboundFrame;

/// An event emitted by the radio IO task.
///
/// Delivery is best-effort through a bounded broadcast channel; a consumer
/// that falls far enough behind loses the oldest frames, which matches the
/// at-most-once posture of the whole gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum RadioEvent {
    /// A well-formed `at+recv=` notification was read from the module.
    FrameReceived(InboundFrame),

    /// The byte stream failed. The IO task has closed the transport and
    /// exited; no further frames will be delivered.
    LinkLost {
        /// Description of the underlying failure.
        reason: String,
    },
}
