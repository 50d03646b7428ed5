//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const DEFAULT_TICK_RATE: u32 = 60; // 60 ticks per second
pub const DEFAULT_GRAVITY_INTERVAL_MS: u64 = 500; // one row per half second

/// Period of one scheduler tick
pub fn tick_duration(ticks_per_second: u32) -> Duration {
    Duration::from_micros(1_000_000 / ticks_per_second.max(1) as u64)
}

/// Monotonic logical clock in milliseconds since creation.
///
/// Backed by `tokio::time::Instant`, so it is immune to wall clock
/// adjustments and follows paused time in tests.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: tokio::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_duration_for_sixty_hz() {
        assert_eq!(tick_duration(60), Duration::from_micros(16_666));
        assert_eq!(tick_duration(0), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn clock_follows_tokio_time() {
        let clock = MonotonicClock::new();
        assert_eq!(clock.now_ms(), 0);
        tokio::time::advance(Duration::from_millis(1250)).await;
        assert_eq!(clock.now_ms(), 1250);
    }
}
