//! One-Time Link Verification
//!
//! Email-verification flows poll a backend until a link is usable. A link's
//! state is structured, and `Consumed` and `Expired` are terminal: once a
//! link reaches either, polling stops because it can never become valid.

use crate::driver::DriverError;
use crate::retry::{Classify, RetryExecutor, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Lifecycle of a one-time verification link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// Not delivered yet
    Pending,
    /// Delivered and unused
    Valid,
    /// Already used
    Consumed,
    /// Past its lifetime
    Expired,
}

impl LinkState {
    /// Whether the link can never become valid again
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Consumed | Self::Expired)
    }

    /// Whether opening the link now would verify
    #[must_use]
    pub const fn accepts_verification(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Valid => "valid",
            Self::Consumed => "consumed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reports the current state of a verification link
pub trait LinkStateSource {
    /// Current state of `link`
    fn link_state(&self, link: &str) -> Result<LinkState, DriverError>;
}

/// Poll `source` until `link` reaches `target`.
///
/// Stops early on a terminal state or on an error the policy does not retry.
/// Running out of attempts is not an error: the last observation is returned.
pub fn await_link_state<S: LinkStateSource + ?Sized>(
    executor: &RetryExecutor,
    source: &S,
    link: &str,
    target: LinkState,
    policy: &RetryPolicy,
) -> Result<LinkState, DriverError> {
    let last = executor.execute_until(
        || source.link_state(link),
        |observed| match observed {
            Ok(state) => *state == target || state.is_terminal(),
            Err(err) => !policy.is_retryable(err.failure_kind()),
        },
        policy,
    );
    match &last {
        Ok(state) if *state == target => debug!(link, state = %state, "link reached target state"),
        Ok(state) => warn!(link, state = %state, target = %target, "link did not reach target state"),
        Err(err) => warn!(link, error = %err, "link state lookup failed"),
    }
    last
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::retry::FailureKind;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::time::Duration;

    struct ScriptedInbox {
        responses: RefCell<VecDeque<Result<LinkState, DriverError>>>,
        calls: RefCell<usize>,
    }

    impl ScriptedInbox {
        fn new(responses: Vec<Result<LinkState, DriverError>>) -> Self {
            Self {
                responses: RefCell::new(responses.into()),
                calls: RefCell::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.borrow()
        }
    }

    impl LinkStateSource for ScriptedInbox {
        fn link_state(&self, _link: &str) -> Result<LinkState, DriverError> {
            *self.calls.borrow_mut() += 1;
            let mut responses = self.responses.borrow_mut();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses.front().cloned().unwrap()
            }
        }
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::network()
            .to_builder()
            .max_attempts(attempts)
            .base_delay(Duration::from_millis(200))
            .jitter(false)
            .build()
            .unwrap()
    }

    fn executor() -> RetryExecutor {
        RetryExecutor::with_clock(FakeClock::shared())
    }

    #[test]
    fn test_terminal_states() {
        assert!(LinkState::Consumed.is_terminal());
        assert!(LinkState::Expired.is_terminal());
        assert!(!LinkState::Valid.is_terminal());
        assert!(!LinkState::Pending.is_terminal());
        assert!(LinkState::Valid.accepts_verification());
        assert!(!LinkState::Consumed.accepts_verification());
    }

    #[test]
    fn test_waits_for_valid() {
        let inbox = ScriptedInbox::new(vec![
            Ok(LinkState::Pending),
            Ok(LinkState::Pending),
            Ok(LinkState::Valid),
        ]);
        let state = await_link_state(&executor(), &inbox, "verify/abc", LinkState::Valid, &policy(5));
        assert_eq!(state.unwrap(), LinkState::Valid);
        assert_eq!(inbox.calls(), 3);
    }

    #[test]
    fn test_consumed_link_stops_immediately() {
        let inbox = ScriptedInbox::new(vec![Ok(LinkState::Consumed)]);
        let state = await_link_state(&executor(), &inbox, "verify/abc", LinkState::Valid, &policy(5));
        assert_eq!(state.unwrap(), LinkState::Consumed);
        assert_eq!(inbox.calls(), 1);
    }

    #[test]
    fn test_exhaustion_returns_last_observation() {
        let inbox = ScriptedInbox::new(vec![Ok(LinkState::Pending)]);
        let state = await_link_state(&executor(), &inbox, "verify/abc", LinkState::Valid, &policy(4));
        assert_eq!(state.unwrap(), LinkState::Pending);
        assert_eq!(inbox.calls(), 4);
    }

    #[test]
    fn test_network_errors_are_ridden_out() {
        let inbox = ScriptedInbox::new(vec![
            Err(DriverError::Network {
                message: "502".into(),
            }),
            Ok(LinkState::Valid),
        ]);
        let state = await_link_state(&executor(), &inbox, "verify/abc", LinkState::Valid, &policy(3));
        assert_eq!(state.unwrap(), LinkState::Valid);
    }

    #[test]
    fn test_non_retryable_error_surfaces() {
        let inbox = ScriptedInbox::new(vec![
            Err(DriverError::Other {
                message: "401 unauthorized".into(),
            }),
            Ok(LinkState::Valid),
        ]);
        let err = await_link_state(&executor(), &inbox, "verify/abc", LinkState::Valid, &policy(3))
            .unwrap_err();
        assert_eq!(err.failure_kind(), FailureKind::Other);
        assert_eq!(inbox.calls(), 1);
    }
}
