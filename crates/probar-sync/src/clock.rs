//! Time Sources for Waits and Backoff
//!
//! Every wait and retry in this crate reads time and sleeps through a
//! [`Clock`]. Production code uses [`SystemClock`]; tests use [`FakeClock`],
//! whose `sleep` advances virtual time instantly so timing bounds can be
//! asserted exactly.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source with a blocking sleep
pub trait Clock: Send + Sync + Debug {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Suspend the calling thread for `duration`
    fn sleep(&self, duration: Duration);

    /// Time elapsed since an earlier [`Clock::now`] reading
    fn since(&self, start: Duration) -> Duration {
        self.now().saturating_sub(start)
    }
}

/// Shared handle to a clock
pub type SharedClock = Arc<dyn Clock>;

/// The default real-time clock
#[must_use]
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock::new())
}

/// Wall-clock time backed by [`Instant`] and [`std::thread::sleep`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is now
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock for deterministic tests.
///
/// Time only moves when someone sleeps on it or calls [`FakeClock::advance`].
#[derive(Debug, Default)]
pub struct FakeClock {
    now_nanos: AtomicU64,
    sleeps: AtomicU64,
    slept_nanos: AtomicU64,
}

impl FakeClock {
    /// Create a clock at virtual time zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared clock at virtual time zero
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Move virtual time forward without counting a sleep
    pub fn advance(&self, duration: Duration) {
        let _ = self
            .now_nanos
            .fetch_add(saturating_nanos(duration), Ordering::SeqCst);
    }

    /// Number of `sleep` calls observed
    #[must_use]
    pub fn sleep_count(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }

    /// Total virtual time spent sleeping
    #[must_use]
    pub fn total_slept(&self) -> Duration {
        Duration::from_nanos(self.slept_nanos.load(Ordering::SeqCst))
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_nanos.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) {
        let nanos = saturating_nanos(duration);
        let _ = self.sleeps.fetch_add(1, Ordering::SeqCst);
        let _ = self.slept_nanos.fetch_add(nanos, Ordering::SeqCst);
        let _ = self.now_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod fake_clock_tests {
        use super::*;

        #[test]
        fn test_starts_at_zero() {
            let clock = FakeClock::new();
            assert_eq!(clock.now(), Duration::ZERO);
            assert_eq!(clock.sleep_count(), 0);
        }

        #[test]
        fn test_sleep_advances_time() {
            let clock = FakeClock::new();
            clock.sleep(Duration::from_millis(500));
            clock.sleep(Duration::from_millis(250));
            assert_eq!(clock.now(), Duration::from_millis(750));
            assert_eq!(clock.sleep_count(), 2);
            assert_eq!(clock.total_slept(), Duration::from_millis(750));
        }

        #[test]
        fn test_advance_is_not_a_sleep() {
            let clock = FakeClock::new();
            clock.advance(Duration::from_secs(2));
            assert_eq!(clock.now(), Duration::from_secs(2));
            assert_eq!(clock.sleep_count(), 0);
        }

        #[test]
        fn test_since() {
            let clock = FakeClock::new();
            let start = clock.now();
            clock.sleep(Duration::from_millis(40));
            assert_eq!(clock.since(start), Duration::from_millis(40));
        }
    }

    mod system_clock_tests {
        use super::*;

        #[test]
        fn test_sleep_blocks() {
            let clock = SystemClock::new();
            let start = clock.now();
            clock.sleep(Duration::from_millis(20));
            assert!(clock.since(start) >= Duration::from_millis(20));
        }

        #[test]
        fn test_shared_system_clock_is_monotonic() {
            let clock = system_clock();
            let a = clock.now();
            let b = clock.now();
            assert!(b >= a);
        }
    }
}
