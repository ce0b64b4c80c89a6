//! Connection parameter negotiation.
//!
//! After a connect the central's parameters are checked against the
//! preferred set.  When they fall outside it we ask for an update after
//! a first delay, then again every next delay, and give up by dropping
//! the link once the attempt budget is spent.
//!
//! Time comes from the caller in milliseconds; nothing here owns a timer.

use crate::ble::radio::ConnParams;
use crate::config::StackConfig;

/// What the session should do after a [`ConnParamsNegotiation::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NegotiationAction {
    /// Send a connection parameter update request with the preferred set.
    RequestUpdate(ConnParams),
    /// The central never agreed; disconnect.
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    deadline_ms: u64,
    attempts: u8,
}

pub struct ConnParamsNegotiation {
    preferred: ConnParams,
    first_delay_ms: u64,
    next_delay_ms: u64,
    max_attempts: u8,
    window: Option<Window>,
}

impl ConnParamsNegotiation {
    pub fn new(config: &StackConfig) -> Self {
        Self {
            preferred: config.preferred_conn_params,
            first_delay_ms: config.first_conn_params_update_delay_ms,
            next_delay_ms: config.next_conn_params_update_delay_ms,
            max_attempts: config.max_conn_params_update_count,
            window: None,
        }
    }

    /// Open a window for a fresh link, unless `current` already conforms.
    pub fn start(&mut self, now_ms: u64, current: &ConnParams) {
        self.window = if current.is_acceptable(&self.preferred) {
            None
        } else {
            Some(Window {
                deadline_ms: now_ms + self.first_delay_ms,
                attempts: 0,
            })
        };
    }

    /// The central applied new parameters.
    pub fn on_params_updated(&mut self, now_ms: u64, params: &ConnParams) {
        if params.is_acceptable(&self.preferred) {
            self.window = None;
        } else if let Some(window) = self.window.as_mut() {
            window.deadline_ms = now_ms + self.next_delay_ms;
        } else {
            self.window = Some(Window {
                deadline_ms: now_ms + self.next_delay_ms,
                attempts: 0,
            });
        }
    }

    /// Advance to `now_ms`. Returns the action that became due, if any.
    pub fn poll(&mut self, now_ms: u64) -> Option<NegotiationAction> {
        let window = self.window.as_mut()?;
        if now_ms < window.deadline_ms {
            return None;
        }
        if window.attempts >= self.max_attempts {
            self.window = None;
            return Some(NegotiationAction::GiveUp);
        }
        window.attempts += 1;
        window.deadline_ms = now_ms + self.next_delay_ms;
        Some(NegotiationAction::RequestUpdate(self.preferred))
    }

    pub fn stop(&mut self) {
        self.window = None;
    }

    pub fn is_open(&self) -> bool {
        self.window.is_some()
    }

    /// Update requests sent in the open window.
    pub fn attempts(&self) -> u8 {
        self.window.map_or(0, |w| w.attempts)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn params(interval: u16) -> ConnParams {
        ConnParams {
            min_interval: interval,
            max_interval: interval,
            slave_latency: 0,
            supervision_timeout: 400,
        }
    }

    fn negotiation() -> ConnParamsNegotiation {
        ConnParamsNegotiation::new(&StackConfig::default())
    }

    #[test]
    fn conforming_link_opens_no_window() {
        let mut n = negotiation();
        n.start(0, &params(24));
        assert!(!n.is_open());
        assert_eq!(n.poll(1_000_000), None);
    }

    #[test]
    fn first_request_waits_for_first_delay() {
        let mut n = negotiation();
        n.start(1_000, &params(6));
        assert!(n.is_open());

        assert_eq!(n.poll(5_999), None);
        assert_eq!(
            n.poll(6_000),
            Some(NegotiationAction::RequestUpdate(
                StackConfig::default().preferred_conn_params
            ))
        );
        assert_eq!(n.attempts(), 1);
        // next one only after the longer delay
        assert_eq!(n.poll(6_001), None);
        assert_eq!(n.poll(35_999), None);
        assert!(matches!(n.poll(36_000), Some(NegotiationAction::RequestUpdate(_))));
    }

    #[test]
    fn gives_up_after_attempt_budget() {
        let mut n = negotiation();
        n.start(0, &params(6));

        let mut now = 5_000;
        for _ in 0..3 {
            assert!(matches!(n.poll(now), Some(NegotiationAction::RequestUpdate(_))));
            now += 30_000;
        }
        assert_eq!(n.poll(now), Some(NegotiationAction::GiveUp));
        assert!(!n.is_open());
        assert_eq!(n.poll(now + 100_000), None);
    }

    #[test]
    fn conforming_update_closes_window() {
        let mut n = negotiation();
        n.start(0, &params(6));
        n.poll(5_000);

        n.on_params_updated(6_000, &params(40));
        assert!(!n.is_open());
        assert_eq!(n.poll(100_000), None);
    }

    #[test]
    fn nonconforming_update_pushes_deadline() {
        let mut n = negotiation();
        n.start(0, &params(6));
        n.on_params_updated(4_000, &params(8));

        assert_eq!(n.poll(5_000), None);
        assert!(n.poll(34_000).is_some());
    }

    #[test]
    fn stop_discards_window() {
        let mut n = negotiation();
        n.start(0, &params(6));
        n.stop();
        assert_eq!(n.poll(5_000), None);
    }
}
