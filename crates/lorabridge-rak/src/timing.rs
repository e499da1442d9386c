//! Protocol timing for the RAK module.
//!
//! The settle delays are quiescence periods the module needs between mode
//! changes. They are not retries.

use std::time::Duration;

/// Delays and response windows used by bring-up and the transmit bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Wait after opening the port before talking to the module.
    pub port_settle: Duration,
    pub after_version: Duration,
    pub after_work_mode: Duration,
    pub after_p2p_config: Duration,
    /// Pause before each transfer-mode switch.
    pub before_mode_switch: Duration,
    /// Pause between a send and the switch back to receive.
    pub after_send: Duration,
    /// Response window for ordinary commands.
    pub at_timeout: Duration,
    pub work_mode_timeout: Duration,
    pub mode_switch_timeout: Duration,
    pub send_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            port_settle: Duration::from_millis(1000),
            after_version: Duration::from_millis(500),
            after_work_mode: Duration::from_millis(2000),
            after_p2p_config: Duration::from_millis(200),
            before_mode_switch: Duration::from_millis(50),
            after_send: Duration::from_millis(100),
            at_timeout: Duration::from_millis(2000),
            work_mode_timeout: Duration::from_millis(5000),
            mode_switch_timeout: Duration::from_millis(1500),
            send_timeout: Duration::from_millis(5000),
        }
    }
}

impl Timing {
    /// No settle delays and short windows. For tests against a mock
    /// transport, which answers instantly.
    pub fn immediate() -> Self {
        Self {
            port_settle: Duration::ZERO,
            after_version: Duration::ZERO,
            after_work_mode: Duration::ZERO,
            after_p2p_config: Duration::ZERO,
            before_mode_switch: Duration::ZERO,
            after_send: Duration::ZERO,
            at_timeout: Duration::from_millis(200),
            work_mode_timeout: Duration::from_millis(200),
            mode_switch_timeout: Duration::from_millis(200),
            send_timeout: Duration::from_millis(200),
        }
    }

    /// Upper bound on one complete transmit bracket, used to guard the
    /// caller's wait on the IO task.
    pub fn transmit_budget(&self) -> Duration {
        self.before_mode_switch * 2
            + self.mode_switch_timeout * 2
            + self.send_timeout
            + self.after_send
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timing_matches_module_requirements() {
        let t = Timing::default();
        assert_eq!(t.after_work_mode, Duration::from_secs(2));
        assert_eq!(t.mode_switch_timeout, Duration::from_millis(1500));
        assert_eq!(t.send_timeout, Duration::from_secs(5));
    }

    #[test]
    fn transmit_budget_covers_bracket() {
        let t = Timing::default();
        assert_eq!(t.transmit_budget(), Duration::from_millis(100 + 3000 + 5000 + 100));
    }
}
