//! Progress relay
//!
//! Sits between the extractor's raw percentages and the wire. Only strictly
//! increasing values are forwarded, optionally no more often than a minimum
//! interval, and a successful extraction always ends on 100%.

use std::time::Duration;
use tokio::time::Instant;

/// Filter deciding which percentages become `206 Partial Content` replies
#[derive(Debug, Clone, Default)]
pub struct ProgressRelay {
    min_interval: Option<Duration>,
    last_sent: Option<u8>,
    last_sent_at: Option<Instant>,
}

impl ProgressRelay {
    /// Create a relay; `min_interval` of `None` forwards every new percentage
    pub fn new(min_interval: Option<Duration>) -> Self {
        Self {
            min_interval,
            ..Default::default()
        }
    }

    /// Whether `pct` should be sent now
    pub fn accept(&mut self, pct: u8) -> bool {
        self.accept_at(pct, Instant::now())
    }

    /// Whether `pct` should be sent at time `now`
    ///
    /// 100% bypasses the interval so completion is never held back.
    pub fn accept_at(&mut self, pct: u8, now: Instant) -> bool {
        if pct > 100 || self.last_sent.is_some_and(|last| pct <= last) {
            return false;
        }
        if pct < 100
            && let (Some(interval), Some(at)) = (self.min_interval, self.last_sent_at)
            && now.saturating_duration_since(at) < interval
        {
            return false;
        }
        self.last_sent = Some(pct);
        self.last_sent_at = Some(now);
        true
    }

    /// Percentage to send after a successful extraction, if 100% has not
    /// been sent yet
    ///
    /// unrar overwrites its counter before reaching 100, so the final value
    /// is usually missing from its output.
    pub fn finish(&mut self) -> Option<u8> {
        if self.last_sent == Some(100) {
            return None;
        }
        self.last_sent = Some(100);
        Some(100)
    }

    /// Last percentage forwarded
    pub fn last_sent(&self) -> Option<u8> {
        self.last_sent
    }
}
