//! Property-based tests for retry budgets, poll windows and soft assertions

#![allow(clippy::expect_used, clippy::unwrap_used)]

use probar_sync::prelude::*;
use proptest::prelude::*;
use std::cell::Cell;
use std::time::Duration;

// ===== Strategy definitions =====

fn retryable_kind_strategy() -> impl Strategy<Value = FailureKind> {
    prop_oneof![
        Just(FailureKind::StaleReference),
        Just(FailureKind::ClickIntercepted),
        Just(FailureKind::Timeout),
    ]
}

fn fatal_kind_strategy() -> impl Strategy<Value = FailureKind> {
    prop_oneof![
        Just(FailureKind::Network),
        Just(FailureKind::NotFound),
        Just(FailureKind::Script),
        Just(FailureKind::Assertion),
        Just(FailureKind::Other),
    ]
}

fn policy_strategy() -> impl Strategy<Value = RetryPolicy> {
    (1u32..=8, 1u64..=2_000, 1.0f64..=3.0).prop_map(|(attempts, base_ms, factor)| {
        RetryPolicy::builder()
            .max_attempts(attempts)
            .base_delay(Duration::from_millis(base_ms))
            .backoff_factor(factor)
            .jitter(false)
            .raise_original(false)
            .build()
            .unwrap()
    })
}

fn state_strategy() -> impl Strategy<Value = ElementState> {
    prop::sample::select(ElementState::ALL.to_vec())
}

// ===== Retry executor =====

proptest! {
    /// An operation failing `k` times is invoked `min(k + 1, max_attempts)` times
    #[test]
    fn prop_invocations_bounded_by_budget(
        policy in policy_strategy(),
        failures in 0u32..12,
        kind in retryable_kind_strategy(),
    ) {
        let clock = FakeClock::shared();
        let executor = RetryExecutor::with_clock(clock.clone());
        let calls = Cell::new(0u32);
        let result = executor.execute(
            || {
                calls.set(calls.get() + 1);
                if calls.get() <= failures { Err(kind) } else { Ok(calls.get()) }
            },
            &policy,
        );

        let expected = (failures + 1).min(policy.max_attempts());
        prop_assert_eq!(calls.get(), expected);
        prop_assert_eq!(result.is_ok(), failures < policy.max_attempts());
        prop_assert_eq!(clock.sleep_count(), u64::from(expected - 1));
    }

    /// Sleeps between attempts follow the backoff schedule exactly without jitter
    #[test]
    fn prop_total_sleep_matches_schedule(policy in policy_strategy()) {
        let clock = FakeClock::shared();
        let executor = RetryExecutor::with_clock(clock.clone());
        let result: Result<(), _> = executor.execute(|| Err(FailureKind::Timeout), &policy);

        let exhausted = result.unwrap_err();
        prop_assert!(exhausted.is_exhausted());
        let expected: Duration = (1..policy.max_attempts()).map(|n| policy.delay_for(n)).sum();
        prop_assert_eq!(clock.total_slept(), expected);
    }

    /// Failures outside the retryable set propagate after one call
    #[test]
    fn prop_fatal_kinds_fail_fast(policy in policy_strategy(), kind in fatal_kind_strategy()) {
        let clock = FakeClock::shared();
        let executor = RetryExecutor::with_clock(clock.clone());
        let calls = Cell::new(0u32);
        let result: Result<(), _> = executor.execute(
            || {
                calls.set(calls.get() + 1);
                Err(kind)
            },
            &policy,
        );

        prop_assert_eq!(calls.get(), 1);
        prop_assert_eq!(clock.sleep_count(), 0);
        prop_assert_eq!(*result.unwrap_err().cause(), kind);
    }

    /// Jittered delays stay within 15% of the nominal delay
    #[test]
    fn prop_jitter_bounds(attempt in 1u32..10, base_ms in 1u64..5_000, factor in 1.0f64..4.0) {
        let base = Duration::from_millis(base_ms);
        let nominal = compute_backoff(attempt, base, factor, false).as_secs_f64();
        let jittered = compute_backoff(attempt, base, factor, true).as_secs_f64();
        prop_assert!(jittered >= nominal * JITTER_LOW - 1e-6);
        prop_assert!(jittered <= nominal * JITTER_HIGH + 1e-6);
    }
}

// ===== Condition poller =====

proptest! {
    /// A condition that never holds times out within one interval of the deadline
    #[test]
    fn prop_timeout_within_one_interval(timeout_ms in 0u64..5_000, interval_ms in 1u64..1_000) {
        let clock = FakeClock::shared();
        let poller = ConditionPoller::with_clock(clock.clone());
        let timeout = Duration::from_millis(timeout_ms);
        let interval = Duration::from_millis(interval_ms);

        let outcome = poller.poll_until(|| false, timeout, Some(interval));
        prop_assert!(outcome.is_timed_out());
        prop_assert!(clock.now() < timeout + interval);
        // the last sleep is cut short, so instant predicates end on the deadline
        prop_assert_eq!(clock.now(), timeout);
    }

    /// A condition that holds from tick `n` is found at `n * interval`
    #[test]
    fn prop_found_on_first_true_tick(tick in 0u32..20, interval_ms in 1u64..500) {
        let clock = FakeClock::shared();
        let poller = ConditionPoller::with_clock(clock.clone());
        let interval = Duration::from_millis(interval_ms);
        let timeout = interval * 25;
        let seen = Cell::new(0u32);

        let (outcome, stats) = poller.poll_with_stats(
            || {
                let current = seen.get();
                seen.set(current + 1);
                Ok::<_, std::convert::Infallible>((current >= tick).then_some(current))
            },
            timeout,
            Some(interval),
        );
        prop_assert_eq!(outcome, WaitOutcome::Found(tick));
        prop_assert_eq!(stats.ticks, tick + 1);
        prop_assert_eq!(stats.elapsed, interval * tick);
    }
}

// ===== Element states and soft assertions =====

proptest! {
    /// Every state parses back from its canonical name, in any case
    #[test]
    fn prop_state_names_parse(state in state_strategy(), upper in any::<bool>()) {
        let name = if upper { state.as_str().to_uppercase() } else { state.as_str().to_string() };
        prop_assert_eq!(name.parse::<ElementState>().unwrap(), state);
    }

    /// The collector records exactly the failed checks, in order, until flushed
    #[test]
    fn prop_soft_collector_counts(checks in prop::collection::vec(any::<bool>(), 0..30)) {
        let mut soft = SoftAssertionCollector::new();
        for (i, passed) in checks.iter().enumerate() {
            let _ = soft.assert_true(*passed, &format!("check {i}"));
        }
        let failed = checks.iter().filter(|passed| !**passed).count();
        prop_assert_eq!(soft.failure_count(), failed);
        prop_assert_eq!(soft.summary().total, checks.len());
        let indices: Vec<usize> = soft.failures().iter().map(|f| f.index).collect();
        prop_assert_eq!(indices, (0..failed).collect::<Vec<_>>());

        let flushed = soft.flush(true);
        prop_assert_eq!(flushed.is_ok(), failed == 0);
        if let Err(aggregated) = flushed {
            prop_assert_eq!(aggregated.count(), failed);
        }
        prop_assert!(!soft.has_failures());
        prop_assert!(soft.flush(true).unwrap());
    }
}
