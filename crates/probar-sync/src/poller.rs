//! Condition Polling
//!
//! The primitive every wait is built on: evaluate a predicate, sleep, repeat,
//! until it yields a value or the timeout passes.
//!
//! ```text
//! t=0        t=I        t=2I            t>=T
//!  │ eval     │ eval     │ eval  ...     │ eval → TimedOut
//!  └─ Some(v) → Found(v) (no further ticks)
//! ```
//!
//! Predicate errors are "not yet" signals: they are logged at debug level and
//! the poll carries on. No sleep runs past the deadline, so the final
//! evaluation starts at the timeout at the latest and a call overshoots it
//! only by that evaluation's own duration.

use crate::clock::{system_clock, SharedClock};
use crate::config::DEFAULT_POLL_INTERVAL_MS;
use std::convert::Infallible;
use std::fmt::Display;
use std::time::Duration;
use tracing::debug;

/// Smallest interval the poller will sleep between ticks
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Result of a wait: the value found, or a timeout.
///
/// Timing out is an ordinary outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub enum WaitOutcome<T> {
    /// The condition produced a value
    Found(T),
    /// The timeout passed first
    TimedOut,
}

impl<T> WaitOutcome<T> {
    /// Check if a value was found
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Check if the wait timed out
    #[must_use]
    pub const fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }

    /// Borrow the found value
    #[must_use]
    pub const fn found(&self) -> Option<&T> {
        match self {
            Self::Found(value) => Some(value),
            Self::TimedOut => None,
        }
    }

    /// Consume into an `Option`
    #[must_use]
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::TimedOut => None,
        }
    }

    /// Map the found value
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> WaitOutcome<U> {
        match self {
            Self::Found(value) => WaitOutcome::Found(f(value)),
            Self::TimedOut => WaitOutcome::TimedOut,
        }
    }
}

impl<T> From<WaitOutcome<T>> for Option<T> {
    fn from(outcome: WaitOutcome<T>) -> Self {
        outcome.into_option()
    }
}

/// Tick count and elapsed time of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollStats {
    /// Predicate evaluations performed
    pub ticks: u32,
    /// Clock time from the first evaluation to the return
    pub elapsed: Duration,
}

/// Repeatedly evaluates a predicate until it yields or times out.
#[derive(Debug, Clone)]
pub struct ConditionPoller {
    clock: SharedClock,
    default_interval: Duration,
}

impl Default for ConditionPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionPoller {
    /// Poller on the real-time clock with the fallback interval
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Poller on an injected clock
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            clock,
            default_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Interval used when a call passes `None`
    #[must_use]
    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Interval used when a call passes `None`
    #[must_use]
    pub const fn default_interval(&self) -> Duration {
        self.default_interval
    }

    /// Clock used for sleeps and elapsed time
    #[must_use]
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Poll until `predicate` yields `Some`, or `timeout` passes
    pub fn poll<T, E, F>(&self, predicate: F, timeout: Duration, interval: Option<Duration>) -> WaitOutcome<T>
    where
        E: Display,
        F: FnMut() -> Result<Option<T>, E>,
    {
        self.poll_with_stats(predicate, timeout, interval).0
    }

    /// [`ConditionPoller::poll`] that also reports tick count and elapsed time
    pub fn poll_with_stats<T, E, F>(
        &self,
        mut predicate: F,
        timeout: Duration,
        interval: Option<Duration>,
    ) -> (WaitOutcome<T>, PollStats)
    where
        E: Display,
        F: FnMut() -> Result<Option<T>, E>,
    {
        let interval = interval
            .unwrap_or(self.default_interval)
            .max(MIN_POLL_INTERVAL);
        let start = self.clock.now();
        let mut stats = PollStats::default();

        loop {
            stats.ticks += 1;
            match predicate() {
                Ok(Some(value)) => {
                    stats.elapsed = self.clock.since(start);
                    return (WaitOutcome::Found(value), stats);
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(tick = stats.ticks, error = %err, "predicate raised, treating as not yet satisfied");
                }
            }

            stats.elapsed = self.clock.since(start);
            if stats.elapsed >= timeout {
                return (WaitOutcome::TimedOut, stats);
            }
            // the last sleep stops at the deadline
            self.clock.sleep(interval.min(timeout - stats.elapsed));
        }
    }

    /// Poll a fallible boolean condition
    pub fn poll_bool<E, F>(&self, mut condition: F, timeout: Duration, interval: Option<Duration>) -> WaitOutcome<()>
    where
        E: Display,
        F: FnMut() -> Result<bool, E>,
    {
        self.poll(move || condition().map(|ok| ok.then_some(())), timeout, interval)
    }

    /// Poll an infallible boolean condition
    pub fn poll_until<F>(&self, mut condition: F, timeout: Duration, interval: Option<Duration>) -> WaitOutcome<()>
    where
        F: FnMut() -> bool,
    {
        self.poll_bool(move || Ok::<_, Infallible>(condition()), timeout, interval)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FakeClock};
    use std::cell::Cell;
    use std::sync::Arc;

    fn fake_poller() -> (Arc<FakeClock>, ConditionPoller) {
        let clock = FakeClock::shared();
        (clock.clone(), ConditionPoller::with_clock(clock))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    mod outcome_tests {
        use super::*;

        #[test]
        fn test_found_helpers() {
            let outcome = WaitOutcome::Found(5);
            assert!(outcome.is_found());
            assert!(!outcome.is_timed_out());
            assert_eq!(outcome.found(), Some(&5));
            assert_eq!(outcome.map(|v| v * 2), WaitOutcome::Found(10));
        }

        #[test]
        fn test_timed_out_helpers() {
            let outcome: WaitOutcome<i32> = WaitOutcome::TimedOut;
            assert!(outcome.is_timed_out());
            assert_eq!(outcome.found(), None);
            assert_eq!(Option::<i32>::from(outcome), None);
        }
    }

    mod timing_tests {
        use super::*;

        #[test]
        fn test_timeout_bound() {
            let (clock, poller) = fake_poller();
            let (outcome, stats) =
                poller.poll_with_stats(|| Ok::<Option<()>, Infallible>(None), ms(2000), Some(ms(500)));
            assert!(outcome.is_timed_out());
            assert!(stats.elapsed >= ms(2000));
            assert!(stats.elapsed <= ms(2500));
            assert_eq!(clock.now(), stats.elapsed);
        }

        #[test]
        fn test_overshoot_bounded_by_one_interval() {
            let (_clock, poller) = fake_poller();
            let (outcome, stats) =
                poller.poll_with_stats(|| Ok::<Option<()>, Infallible>(None), ms(1000), Some(ms(300)));
            assert!(outcome.is_timed_out());
            // ticks at 0, 300, 600, 900, then on the deadline
            assert_eq!(stats.ticks, 5);
            assert_eq!(stats.elapsed, ms(1000));
        }

        #[test]
        fn test_slow_predicate_stays_within_one_interval() {
            let (clock, poller) = fake_poller();
            let (outcome, stats) = poller.poll_with_stats(
                || {
                    clock.advance(ms(100));
                    Ok::<Option<()>, Infallible>(None)
                },
                ms(701),
                Some(ms(500)),
            );
            assert!(outcome.is_timed_out());
            // evaluations start at 0, 600 and 701
            assert_eq!(stats.ticks, 3);
            assert_eq!(stats.elapsed, ms(801));
            assert!(stats.elapsed <= ms(701) + ms(500));
        }

        #[test]
        fn test_early_success_stops_ticking() {
            let (clock, poller) = fake_poller();
            let evaluations = Cell::new(0u32);
            let (outcome, stats) = poller.poll_with_stats(
                || {
                    evaluations.set(evaluations.get() + 1);
                    Ok::<_, Infallible>((evaluations.get() == 5).then_some("ready"))
                },
                ms(5000),
                Some(ms(500)),
            );
            assert_eq!(outcome, WaitOutcome::Found("ready"));
            assert_eq!(evaluations.get(), 5);
            assert_eq!(stats.elapsed, ms(2000));
            assert_eq!(clock.sleep_count(), 4);
        }

        #[test]
        fn test_immediate_success_never_sleeps() {
            let (clock, poller) = fake_poller();
            let outcome = poller.poll_until(|| true, ms(1000), None);
            assert!(outcome.is_found());
            assert_eq!(clock.sleep_count(), 0);
        }

        #[test]
        fn test_zero_timeout_evaluates_once() {
            let (clock, poller) = fake_poller();
            let evaluations = Cell::new(0);
            let outcome = poller.poll_until(
                || {
                    evaluations.set(evaluations.get() + 1);
                    false
                },
                Duration::ZERO,
                None,
            );
            assert!(outcome.is_timed_out());
            assert_eq!(evaluations.get(), 1);
            assert_eq!(clock.sleep_count(), 0);
        }

        #[test]
        fn test_default_interval_used_when_none() {
            let (clock, poller) = fake_poller();
            let poller = poller.with_default_interval(ms(250));
            let _ = poller.poll_until(|| false, ms(1000), None);
            assert_eq!(clock.total_slept(), ms(1000));
            assert_eq!(clock.sleep_count(), 4);
        }

        #[test]
        fn test_zero_interval_clamped() {
            let (clock, poller) = fake_poller();
            let _ = poller.poll_until(|| false, ms(5), Some(Duration::ZERO));
            assert_eq!(clock.sleep_count(), 5);
        }
    }

    mod error_tests {
        use super::*;

        #[test]
        fn test_errors_are_not_yet() {
            let (_clock, poller) = fake_poller();
            let evaluations = Cell::new(0);
            let outcome = poller.poll(
                || {
                    evaluations.set(evaluations.get() + 1);
                    if evaluations.get() < 3 {
                        Err("element not attached yet")
                    } else {
                        Ok(Some(evaluations.get()))
                    }
                },
                ms(5000),
                Some(ms(100)),
            );
            assert_eq!(outcome, WaitOutcome::Found(3));
        }

        #[test]
        fn test_persistent_errors_time_out() {
            let (_clock, poller) = fake_poller();
            let outcome = poller.poll_bool(|| Err::<bool, _>("boom"), ms(300), Some(ms(100)));
            assert!(outcome.is_timed_out());
        }
    }

    #[test]
    fn test_real_clock_poll() {
        let poller = ConditionPoller::new();
        let start = std::time::Instant::now();
        let outcome = poller.poll_until(|| false, ms(30), Some(ms(10)));
        assert!(outcome.is_timed_out());
        assert!(start.elapsed() >= ms(30));
    }
}
