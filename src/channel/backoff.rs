//! Reconnect Backoff
//!
//! Linear backoff with a hard attempt ceiling and no jitter: the n-th retry
//! waits `base_delay * n`. Once the ceiling is reached the channel gives up
//! for good.
//!
//! An explicit connect is an operator intervention and starts a fresh budget
//! whenever the counter is exhausted, whether the channel is still `Failed`
//! or was disconnected after failing. A connect with budget left keeps the
//! counter; only a successful connect resets it.

use std::fmt;
use std::time::Duration;

/// Connection state of the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect attempts exhausted; only an explicit connect recovers
    Failed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Failed => "failed",
        };
        f.pad(s)
    }
}

/// Observable snapshot of the channel session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStatus {
    pub state: ChannelState,
    /// Failed attempts since the last successful connect
    pub attempts: u32,
    pub reconnect_pending: bool,
}

impl ChannelStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }
}

/// Reconnect limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given (1-based) attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Outcome of a reconnect evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
}

/// Attempt counter driven by connection outcomes
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }

    /// Called on every successful connect
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Evaluate a failure: bump the counter or give up at the ceiling
    pub fn next(&mut self) -> ReconnectDecision {
        if self.is_exhausted() {
            return ReconnectDecision::GiveUp {
                attempts: self.attempts,
            };
        }

        self.attempts += 1;
        ReconnectDecision::Retry {
            attempt: self.attempts,
            delay: self.policy.delay_for(self.attempts),
        }
    }
}
