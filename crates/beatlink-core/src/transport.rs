use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Lag, in periods, after which the schedule re-anchors instead of catching up.
pub const MAX_CATCH_UP_TICKS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    Stopped,
    Playing,
}

#[derive(Debug, Clone)]
pub struct Transport {
    state: TransportState,
    period: Duration,
    next_tick_at: Option<Instant>,
    runs: u64,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            state: TransportState::Stopped,
            period: Duration::ZERO,
            next_tick_at: None,
            runs: 0,
        }
    }
}

impl Transport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> TransportState {
        self.state
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    #[must_use]
    pub fn period(&self) -> Option<Duration> {
        self.is_playing().then_some(self.period)
    }

    #[must_use]
    pub fn next_tick_at(&self) -> Option<Instant> {
        self.next_tick_at
    }

    #[must_use]
    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn start(&mut self, period: Duration, now: Instant) -> bool {
        if self.is_playing() {
            debug!("transport already running, start ignored");
            return false;
        }
        self.state = TransportState::Playing;
        self.schedule(period, now);
        true
    }

    pub fn stop(&mut self) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.state = TransportState::Stopped;
        self.next_tick_at = None;
        true
    }

    pub fn restart(&mut self, period: Duration, now: Instant) -> bool {
        if !self.stop() {
            return false;
        }
        self.start(period, now)
    }

    /// Claims the next due tick, if any, and advances the schedule by one period.
    pub fn take_due(&mut self, now: Instant) -> Option<Instant> {
        let due = self.next_tick_at?;
        if now < due {
            return None;
        }

        let lag = now.duration_since(due);
        let scheduled = if lag > self.period * MAX_CATCH_UP_TICKS {
            warn!(
                lag_ms = lag.as_millis(),
                period_ms = self.period.as_millis(),
                "transport fell behind, re-anchoring schedule"
            );
            now
        } else {
            due
        };
        self.next_tick_at = Some(scheduled + self.period);
        Some(scheduled)
    }

    fn schedule(&mut self, period: Duration, now: Instant) {
        self.period = period.max(Duration::from_millis(1));
        self.next_tick_at = Some(now + self.period);
        self.runs += 1;
    }
}
