//! Soft Assertions
//!
//! Collect assertion failures through a test without stopping it, then flush
//! them as one aggregated failure.
//!
//! Every `assert_*` evaluates immediately and returns whether it passed, so
//! calling code can branch on the result. A collector belongs to a single
//! test; its `&mut self` API keeps it out of shared use.
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut soft = SoftAssertionCollector::new();
//! soft.assert_eq(&cart.count(), &3, "cart count");
//! if soft.assert_element_visible(&waiter, &checkout, "checkout button", None) {
//!     page.click(&checkout)?;
//! }
//! soft.assert_all()?;
//! ```

use crate::diagnostics::Diagnostics;
use crate::element_wait::{ElementState, ElementStateWaiter};
use crate::locator::Locator;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Write as _};
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, error};

/// A single recorded failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionFailure {
    /// 0-based position among this collector's failures
    pub index: usize,
    /// Message describing the failure
    pub message: String,
    /// Expected value, rendered with `Debug`
    pub expected: Option<String>,
    /// Actual value, rendered with `Debug`
    pub actual: Option<String>,
    /// Diagnostic screenshot, if one was captured
    pub screenshot: Option<PathBuf>,
    /// When the failure was recorded
    pub timestamp: SystemTime,
}

impl AssertionFailure {
    /// Create a new assertion failure
    #[must_use]
    pub fn new(message: impl Into<String>, index: usize) -> Self {
        Self {
            index,
            message: message.into(),
            expected: None,
            actual: None,
            screenshot: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Attach expected and actual values
    #[must_use]
    pub fn with_values(mut self, expected: impl Debug, actual: impl Debug) -> Self {
        self.expected = Some(format!("{expected:?}"));
        self.actual = Some(format!("{actual:?}"));
        self
    }

    /// Attach a screenshot path
    #[must_use]
    pub fn with_screenshot(mut self, path: Option<PathBuf>) -> Self {
        self.screenshot = path;
        self
    }

    /// One-line rendering used in aggregated reports
    #[must_use]
    pub fn describe(&self) -> String {
        let mut line = self.message.clone();
        if let (Some(expected), Some(actual)) = (&self.expected, &self.actual) {
            let _ = write!(line, " (expected {expected}, actual {actual})");
        }
        if let Some(path) = &self.screenshot {
            let _ = write!(line, " [screenshot: {}]", path.display());
        }
        line
    }
}

/// Counts of checked, passed and failed assertions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionSummary {
    /// Total assertions checked
    pub total: usize,
    /// Assertions that passed
    pub passed: usize,
    /// Assertions that failed
    pub failed: usize,
}

/// All failures of one flush, numbered in insertion order
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AggregatedAssertionFailure {
    /// The flushed failures
    pub failures: Vec<AssertionFailure>,
    /// Rendered report
    pub message: String,
}

impl AggregatedAssertionFailure {
    /// Build the numbered report for `failures`
    #[must_use]
    pub fn new(failures: Vec<AssertionFailure>) -> Self {
        let mut message = format!("{} soft assertion(s) failed:", failures.len());
        for (i, failure) in failures.iter().enumerate() {
            let _ = write!(message, "\n  {}. {}", i + 1, failure.describe());
        }
        Self { failures, message }
    }

    /// Number of failures
    #[must_use]
    pub fn count(&self) -> usize {
        self.failures.len()
    }
}

/// Accumulates assertion failures for one test
#[derive(Debug, Default)]
pub struct SoftAssertionCollector {
    failures: Vec<AssertionFailure>,
    assertion_count: usize,
}

impl SoftAssertionCollector {
    /// Create an empty collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `condition`; fails when false
    pub fn assert_true(&mut self, condition: bool, message: &str) -> bool {
        self.check(condition, || {
            AssertionFailure::new(format!("{message}: expected true, got false"), 0)
        })
    }

    /// Record `condition`; fails when true
    pub fn assert_false(&mut self, condition: bool, message: &str) -> bool {
        self.check(!condition, || {
            AssertionFailure::new(format!("{message}: expected false, got true"), 0)
        })
    }

    /// Fails unless `actual == expected`
    pub fn assert_eq<T: PartialEq + Debug>(&mut self, actual: &T, expected: &T, message: &str) -> bool {
        self.check(actual == expected, || {
            AssertionFailure::new(message, 0).with_values(expected, actual)
        })
    }

    /// Fails when `actual == unexpected`
    pub fn assert_ne<T: PartialEq + Debug>(&mut self, actual: &T, unexpected: &T, message: &str) -> bool {
        self.check(actual != unexpected, || {
            AssertionFailure::new(
                format!("{message}: expected values to differ, both were {actual:?}"),
                0,
            )
        })
    }

    /// Fails unless `haystack` contains `needle`
    pub fn assert_contains(&mut self, haystack: &str, needle: &str, message: &str) -> bool {
        self.check(haystack.contains(needle), || {
            AssertionFailure::new(
                format!("{message}: expected '{haystack}' to contain '{needle}'"),
                0,
            )
        })
    }

    /// Fails on `None`
    pub fn assert_some<T>(&mut self, value: &Option<T>, message: &str) -> bool {
        self.check(value.is_some(), || {
            AssertionFailure::new(format!("{message}: expected Some, got None"), 0)
        })
    }

    /// Single visibility wait on `locator`; no retrying.
    ///
    /// On failure the waiter's screenshot hook, if any, is attached to the
    /// recorded failure.
    pub fn assert_element_visible(
        &mut self,
        waiter: &ElementStateWaiter,
        locator: &Locator,
        name: &str,
        timeout: Option<Duration>,
    ) -> bool {
        let quiet = waiter.clone().with_diagnostics(Diagnostics::disabled());
        let visible = quiet
            .wait_for_state(locator, ElementState::Visible, timeout)
            .is_found();
        self.check(visible, || {
            let screenshot = waiter
                .diagnostics()
                .capture_on_failure(&format!("soft assert {name} visible"));
            AssertionFailure::new(format!("{name} ({locator}) is not visible"), 0)
                .with_screenshot(screenshot)
        })
    }

    /// Record an unconditional failure
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        let _ = self.check(false, || AssertionFailure::new(message, 0));
    }

    fn check(&mut self, passed: bool, failure: impl FnOnce() -> AssertionFailure) -> bool {
        self.assertion_count += 1;
        if !passed {
            let mut failure = failure();
            failure.index = self.failures.len();
            debug!(index = failure.index, message = %failure.message, "soft assertion failed");
            self.failures.push(failure);
        }
        passed
    }

    /// Whether any failure is pending
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Pending failures in insertion order
    #[must_use]
    pub fn failures(&self) -> &[AssertionFailure] {
        &self.failures
    }

    /// Number of pending failures
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Assertions checked since the last clear
    #[must_use]
    pub const fn assertion_count(&self) -> usize {
        self.assertion_count
    }

    /// Summary of the assertions
    #[must_use]
    pub fn summary(&self) -> AssertionSummary {
        AssertionSummary {
            total: self.assertion_count,
            passed: self.assertion_count.saturating_sub(self.failures.len()),
            failed: self.failures.len(),
        }
    }

    /// Drop pending failures and reset the counter
    pub fn clear(&mut self) {
        self.failures.clear();
        self.assertion_count = 0;
    }

    /// Report pending failures and clear them.
    ///
    /// Returns `Ok(true)` when nothing failed. Otherwise logs the aggregated
    /// report and returns `Err` when `raise_on_failure` is set, `Ok(false)`
    /// when it is not.
    pub fn flush(&mut self, raise_on_failure: bool) -> Result<bool, AggregatedAssertionFailure> {
        if self.failures.is_empty() {
            self.assertion_count = 0;
            return Ok(true);
        }
        let aggregated = AggregatedAssertionFailure::new(std::mem::take(&mut self.failures));
        self.assertion_count = 0;
        error!(count = aggregated.count(), "{}", aggregated.message);
        if raise_on_failure {
            Err(aggregated)
        } else {
            Ok(false)
        }
    }

    /// `flush(true)`
    pub fn assert_all(&mut self) -> Result<(), AggregatedAssertionFailure> {
        self.flush(true).map(|_| ())
    }
}
