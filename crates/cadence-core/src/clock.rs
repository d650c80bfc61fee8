//! Injectable wall-clock abstraction.
//!
//! Every time read in the session and timer layers goes through [`Clock`]
//! so that tests can drive the state machines on a virtual timeline.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of wall-clock milliseconds since the Unix epoch.
pub trait Clock: fmt::Debug + Send + Sync {
    /// Current wall-clock time in milliseconds.
    fn now_ms(&self) -> i64;
}

/// A shareable clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// The production clock, backed by [`SystemTime`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as i64
    }
}

/// A manually advanced clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start_ms`.
    #[must_use]
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    /// Create a shareable clock frozen at `start_ms`.
    #[must_use]
    pub fn shared(start_ms: i64) -> Arc<Self> {
        Arc::new(Self::new(start_ms))
    }

    /// Move the clock forward by `delta_ms`.
    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Jump the clock to an absolute time.
    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic_enough() {
        let clock = SystemClock;
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000); // After September 2020.
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000_000);
        assert_eq!(clock.now_ms(), 1_000_000);

        clock.advance(25_000);
        assert_eq!(clock.now_ms(), 1_025_000);

        clock.set(2_000_000);
        assert_eq!(clock.now_ms(), 2_000_000);
    }
}
