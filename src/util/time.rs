//! Time utilities for the match clock

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds (stamped on outgoing messages)
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Default tick rate for the host loop
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Tick interval for a given rate
pub fn tick_interval(tick_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / tick_rate.max(1) as u64)
}

/// Monotonic millisecond clock.
///
/// Every timing rule in the core takes `now` in these units, so tests pass
/// literal values while the binary reads them from here.
#[derive(Debug, Clone)]
pub struct MatchClock {
    start: Instant,
}

impl MatchClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for MatchClock {
    fn default() -> Self {
        Self::new()
    }
}
