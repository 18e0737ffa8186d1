//! Stall Watchdog - detects a telemetry stream that stopped delivering frames
//!
//! The controller publishes telemetry at a fixed cadence. If no complete frame
//! arrives within `stall_factor × telemetry_period`, the connection is treated
//! as lost even though the socket may still be open.
//!
//! Time is measured relative to a process-wide monotonic anchor so the value
//! fits in an `AtomicU64` and is unaffected by wall-clock adjustments.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static APP_START: OnceLock<Instant> = OnceLock::new();

fn monotonic_micros() -> u64 {
    let start = APP_START.get_or_init(Instant::now);
    start.elapsed().as_micros() as u64
}

/// Stream stall detector
pub struct StallWatchdog {
    last_frame: AtomicU64,
    timeout: Duration,
}

impl StallWatchdog {
    /// Create a watchdog armed from now
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_frame: AtomicU64::new(monotonic_micros()),
            timeout,
        }
    }

    /// Record that a complete frame was received
    pub fn register_frame(&self) {
        self.last_frame.store(monotonic_micros(), Ordering::Relaxed);
    }

    /// Returns true while frames keep arriving within the timeout window
    pub fn check(&self) -> bool {
        self.time_since_last_frame() < self.timeout
    }

    pub fn time_since_last_frame(&self) -> Duration {
        let last_us = self.last_frame.load(Ordering::Relaxed);
        Duration::from_micros(monotonic_micros().saturating_sub(last_us))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_watchdog_initially_alive() {
        let watchdog = StallWatchdog::new(Duration::from_secs(1));
        assert!(watchdog.check());
    }

    #[test]
    fn test_watchdog_trips_after_timeout() {
        let watchdog = StallWatchdog::new(Duration::from_millis(50));
        thread::sleep(Duration::from_millis(100));
        assert!(!watchdog.check(), "watchdog should trip without frames");
    }

    #[test]
    fn test_frame_resets_timer() {
        let watchdog = StallWatchdog::new(Duration::from_millis(100));
        thread::sleep(Duration::from_millis(60));
        watchdog.register_frame();
        thread::sleep(Duration::from_millis(60));
        assert!(watchdog.check(), "frame should re-arm the watchdog");
        assert!(watchdog.time_since_last_frame() >= Duration::from_millis(60));
    }

    #[test]
    fn test_monotonic_micros_never_decreases() {
        let mut last = monotonic_micros();
        for _ in 0..50 {
            thread::sleep(Duration::from_micros(100));
            let current = monotonic_micros();
            assert!(current >= last);
            last = current;
        }
    }
}
