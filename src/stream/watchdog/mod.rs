
use std::time::Duration;
use tokio::time::Instant;

/// Tracks time since the last byte arrived on an open connection.
///
/// Pure timer bookkeeping: the caller feeds it the current instant around every read.
#[derive(Debug, Clone, Copy)]
pub struct IdleWatchdog {
    threshold: Duration,
    last_activity: Instant,
}

impl IdleWatchdog {
    #[inline]
    pub fn new(threshold: Duration, now: Instant) -> Self {
        Self {
            threshold,
            last_activity: now,
        }
    }

    #[inline]
    pub fn observe_activity(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Whether strictly more than the threshold has passed since the last activity.
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_activity) > self.threshold
    }

    /// Time left before the connection counts as stalled.
    #[inline]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.threshold
            .saturating_sub(now.saturating_duration_since(self.last_activity))
    }

    #[inline]
    pub fn threshold(&self) -> Duration {
        self.threshold
    }
}
