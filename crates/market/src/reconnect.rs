use std::time::Duration;

use optionbot_core::config::FeedConfig;
use tracing::warn;

/// Connection lifecycle of the push feed, tracked explicitly so the
/// supervising task (and its tests) never have to infer state from socket
/// handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
}

/// What the supervisor should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Sleep the fixed delay and try again.
    Retry { after: Duration },
    /// Same, but the failure streak crossed the alert threshold.
    RetryAndAlert { after: Duration, consecutive: u32 },
}

/// Fixed-delay retry policy. Deliberately not exponential: the feed is
/// low-volume and a constant short delay recovers faster from transient
/// drops.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    pub alert_after: u32,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn from_feed_config(feed: &FeedConfig) -> Self {
        Self {
            delay: Duration::from_secs(feed.reconnect_delay_secs),
            alert_after: feed.max_reconnect_failures,
        }
    }
}

/// Drives the Disconnected → Connecting → Connected state machine.
#[derive(Debug)]
pub struct ReconnectTracker {
    policy: ReconnectPolicy,
    state: ConnState,
    consecutive_failures: u32,
}

impl ReconnectTracker {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnState::Disconnected,
            consecutive_failures: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnState {
        self.state
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn on_attempt(&mut self) {
        self.state = ConnState::Connecting;
    }

    pub fn on_connected(&mut self) {
        self.state = ConnState::Connected;
        self.consecutive_failures = 0;
    }

    /// Records a failed attempt or a dropped connection and decides the next
    /// step. The alert fires once per threshold multiple, not on every
    /// failure past it.
    pub fn on_failure(&mut self) -> FailureOutcome {
        self.state = ConnState::Disconnected;
        self.consecutive_failures += 1;
        if self.policy.alert_after > 0 && self.consecutive_failures % self.policy.alert_after == 0 {
            warn!(
                consecutive = self.consecutive_failures,
                "push feed reconnect failing repeatedly"
            );
            FailureOutcome::RetryAndAlert {
                after: self.policy.delay,
                consecutive: self.consecutive_failures,
            }
        } else {
            FailureOutcome::Retry {
                after: self.policy.delay,
            }
        }
    }
}
