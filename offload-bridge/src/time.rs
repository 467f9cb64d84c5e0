//! Time Abstraction
//!
//! Injectable time source so heartbeat and grace-delay logic can be tested
//! deterministically.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Time source trait
///
/// # Example
///
/// ```ignore
/// use offload_bridge::time::Clock;
///
/// fn stamp_heartbeat(clock: &dyn Clock) -> i64 {
///     clock.unix_timestamp()
/// }
/// ```
pub trait Clock: Send + Sync {
    /// Get current UTC time
    fn now(&self) -> DateTime<Utc>;

    /// Get current Unix timestamp in seconds
    fn unix_timestamp(&self) -> i64 {
        self.now().timestamp()
    }

    /// Get current Unix timestamp in milliseconds
    fn unix_timestamp_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// System clock implementation using actual system time
#[derive(Debug, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests
///
/// Starts at a fixed instant and only moves when told to, which makes
/// staleness-window and grace-delay assertions exact.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a manual clock starting at a Unix timestamp
    pub fn at_timestamp(secs: i64) -> Self {
        let start = DateTime::from_timestamp(secs, 0).expect("valid timestamp");
        Self::new(start)
    }

    /// Move the clock forward by whole seconds
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now += chrono::Duration::seconds(secs);
    }

    /// Set the clock to an absolute instant
    pub fn set(&self, instant: DateTime<Utc>) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.unix_timestamp();
        let b = clock.unix_timestamp();
        assert!(b >= a);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::at_timestamp(1_000_000);
        assert_eq!(clock.unix_timestamp(), 1_000_000);

        clock.advance_secs(120);
        assert_eq!(clock.unix_timestamp(), 1_000_120);
    }
}
