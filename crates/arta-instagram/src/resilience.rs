use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Connection lifecycle states.
pub enum LinkStatus {
    Disconnected,
    Authenticating,
    Connected,
    Reconnecting,
    Failed,
}

impl LinkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/// Backoff tuning for reconnection attempts.
pub struct ReconnectPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// What the supervisor should do after a connection loss.
pub enum ReconnectDirective {
    RetryAfter(Duration),
    GiveUp,
}

/// Explicit connection state machine.
///
/// Driven by discrete events so reconnection behavior is testable without
/// real timers: the caller owns the clock and sleeps for whatever delay
/// [`ConnectionMonitor::begin_reconnect`] hands back.
#[derive(Debug)]
pub struct ConnectionMonitor {
    status: LinkStatus,
    attempt_count: u32,
    policy: ReconnectPolicy,
}

impl ConnectionMonitor {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            status: LinkStatus::Disconnected,
            attempt_count: 0,
            policy,
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Enters `Authenticating` ahead of a login attempt.
    pub fn begin_authentication(&mut self) {
        self.status = LinkStatus::Authenticating;
    }

    /// Records a successful login; the attempt counter resets the instant the
    /// connection is established.
    pub fn mark_connected(&mut self) {
        self.status = LinkStatus::Connected;
        self.attempt_count = 0;
    }

    /// Records a failed first-boot login. Terminal for the process lifetime.
    pub fn mark_failed(&mut self) {
        self.status = LinkStatus::Failed;
    }

    /// Records a graceful shutdown. No auto-reconnect follows.
    pub fn mark_disconnected(&mut self) {
        self.status = LinkStatus::Disconnected;
    }

    /// Handles a subscription error or disconnect. Increments the attempt
    /// counter before computing the delay; once the ceiling is reached the
    /// state is `Failed` permanently.
    pub fn begin_reconnect(&mut self) -> ReconnectDirective {
        if self.attempt_count >= self.policy.max_attempts {
            self.status = LinkStatus::Failed;
            return ReconnectDirective::GiveUp;
        }
        self.status = LinkStatus::Reconnecting;
        self.attempt_count = self.attempt_count.saturating_add(1);
        ReconnectDirective::RetryAfter(self.backoff_delay())
    }

    fn backoff_delay(&self) -> Duration {
        let exponent = self.attempt_count.min(20);
        let exponential = self
            .policy
            .base_delay_ms
            .max(1)
            .saturating_mul(1_u64 << exponent);
        Duration::from_millis(exponential.min(self.policy.max_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ConnectionMonitor, LinkStatus, ReconnectDirective, ReconnectPolicy};

    fn monitor(base_delay_ms: u64, max_delay_ms: u64, max_attempts: u32) -> ConnectionMonitor {
        ConnectionMonitor::new(ReconnectPolicy {
            base_delay_ms,
            max_delay_ms,
            max_attempts,
        })
    }

    #[test]
    fn unit_connect_resets_attempt_counter() {
        let mut monitor = monitor(100, 30_000, 5);
        monitor.begin_authentication();
        assert_eq!(monitor.status(), LinkStatus::Authenticating);
        monitor.mark_connected();
        assert_eq!(monitor.status(), LinkStatus::Connected);

        let _ = monitor.begin_reconnect();
        assert_eq!(monitor.attempt_count(), 1);
        monitor.begin_authentication();
        monitor.mark_connected();
        assert_eq!(monitor.attempt_count(), 0);
    }

    #[test]
    fn functional_backoff_doubles_and_caps_at_max_delay() {
        let mut monitor = monitor(1_000, 30_000, 10);
        let mut delays = Vec::new();
        for _ in 0..6 {
            match monitor.begin_reconnect() {
                ReconnectDirective::RetryAfter(delay) => delays.push(delay),
                ReconnectDirective::GiveUp => break,
            }
        }
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(2_000),
                Duration::from_millis(4_000),
                Duration::from_millis(8_000),
                Duration::from_millis(16_000),
                Duration::from_millis(30_000),
                Duration::from_millis(30_000),
            ]
        );
    }

    #[test]
    fn functional_nth_retry_is_bounded_by_policy() {
        // For every N <= ceiling the Nth delay is at least base * 2^(N-1)
        // and never above max_delay.
        let policy_base = 500_u64;
        let mut monitor = monitor(policy_base, 30_000, 8);
        for attempt in 1..=8_u32 {
            let ReconnectDirective::RetryAfter(delay) = monitor.begin_reconnect() else {
                unreachable!("ceiling not yet reached");
            };
            let floor = policy_base.saturating_mul(1 << (attempt - 1).min(20));
            assert!(delay >= Duration::from_millis(floor.min(30_000)));
            assert!(delay <= Duration::from_millis(30_000));
        }
    }

    #[test]
    fn unit_ceiling_exhaustion_is_terminal() {
        let mut monitor = monitor(10, 100, 2);
        assert!(matches!(
            monitor.begin_reconnect(),
            ReconnectDirective::RetryAfter(_)
        ));
        assert!(matches!(
            monitor.begin_reconnect(),
            ReconnectDirective::RetryAfter(_)
        ));
        assert_eq!(monitor.begin_reconnect(), ReconnectDirective::GiveUp);
        assert_eq!(monitor.status(), LinkStatus::Failed);
        // Further attempts never leave the failed state.
        assert_eq!(monitor.begin_reconnect(), ReconnectDirective::GiveUp);
        assert_eq!(monitor.status(), LinkStatus::Failed);
    }

    #[test]
    fn unit_graceful_shutdown_is_disconnected_not_failed() {
        let mut monitor = monitor(10, 100, 2);
        monitor.begin_authentication();
        monitor.mark_connected();
        monitor.mark_disconnected();
        assert_eq!(monitor.status(), LinkStatus::Disconnected);
    }
}
