//! Element State Waits
//!
//! Page objects synchronize on a located element reaching a named state
//! before acting on it.
//!
//! | State          | Reached when                                         |
//! |----------------|------------------------------------------------------|
//! | `Present`      | `find_element` resolves                              |
//! | `Visible`      | resolved and displayed                               |
//! | `Clickable`    | resolved, displayed and enabled                      |
//! | `Selected`     | resolved and selected                                |
//! | `NotSelected`  | resolved and not selected                            |
//! | `Invisible`    | not found, not displayed, or stale (handle is `None`)|
//!
//! Waits never raise on timeout. They log a warning with the locator, state,
//! timeout and elapsed time, capture a screenshot when a hook is installed,
//! and return [`WaitOutcome::TimedOut`].

use crate::clock::SharedClock;
use crate::config::{SyncConfig, TimeoutTable};
use crate::diagnostics::Diagnostics;
use crate::driver::{DriverError, ElementDriver, ElementHandle};
use crate::locator::Locator;
use crate::poller::{ConditionPoller, PollStats, WaitOutcome};
use crate::result::{SyncError, SyncResult};
use crate::retry::{RetryExecutor, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Script used by [`ElementStateWaiter::wait_for_page_ready`]
pub const READY_STATE_SCRIPT: &str = "return document.readyState";

/// Target state of an element wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementState {
    /// Rendered and visible
    Visible,
    /// Visible and enabled
    Clickable,
    /// Attached to the document
    Present,
    /// Absent, hidden or detached
    Invisible,
    /// Checkbox/option/radio is selected
    Selected,
    /// Checkbox/option/radio is not selected
    NotSelected,
}

impl ElementState {
    /// Every state
    pub const ALL: [Self; 6] = [
        Self::Visible,
        Self::Clickable,
        Self::Present,
        Self::Invisible,
        Self::Selected,
        Self::NotSelected,
    ];

    /// Canonical lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Visible => "visible",
            Self::Clickable => "clickable",
            Self::Present => "present",
            Self::Invisible => "invisible",
            Self::Selected => "selected",
            Self::NotSelected => "not_selected",
        }
    }
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementState {
    type Err = SyncError;

    fn from_str(s: &str) -> SyncResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "visible" => Ok(Self::Visible),
            "clickable" => Ok(Self::Clickable),
            "present" => Ok(Self::Present),
            "invisible" => Ok(Self::Invisible),
            "selected" => Ok(Self::Selected),
            "not_selected" | "notselected" | "not-selected" => Ok(Self::NotSelected),
            _ => Err(SyncError::UnknownElementState {
                value: s.to_string(),
            }),
        }
    }
}

/// One timeout window of a state wait
struct Window {
    outcome: WaitOutcome<Option<ElementHandle>>,
    stats: PollStats,
    last_error: Option<DriverError>,
}

/// Waits for elements to reach an [`ElementState`].
#[derive(Clone)]
pub struct ElementStateWaiter {
    driver: Arc<dyn ElementDriver>,
    poller: ConditionPoller,
    timeouts: TimeoutTable,
    diagnostics: Diagnostics,
}

impl fmt::Debug for ElementStateWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementStateWaiter")
            .field("poller", &self.poller)
            .field("timeouts", &self.timeouts)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl ElementStateWaiter {
    /// Waiter on the real-time clock with fallback defaults
    #[must_use]
    pub fn new(driver: Arc<dyn ElementDriver>) -> Self {
        Self {
            driver,
            poller: ConditionPoller::new(),
            timeouts: TimeoutTable::default(),
            diagnostics: Diagnostics::disabled(),
        }
    }

    /// Use `clock` for polling and retry backoff
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        let interval = self.poller.default_interval();
        self.poller = ConditionPoller::with_clock(clock).with_default_interval(interval);
        self
    }

    /// Take timeouts and poll interval from injected configuration
    #[must_use]
    pub fn with_config(mut self, config: &SyncConfig) -> Self {
        self.timeouts = config.timeouts;
        self.poller = self.poller.with_default_interval(config.poll_interval);
        self
    }

    /// Install a screenshot hook for terminal timeouts
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Underlying poller
    #[must_use]
    pub const fn poller(&self) -> &ConditionPoller {
        &self.poller
    }

    /// Per-state default timeouts
    #[must_use]
    pub const fn timeouts(&self) -> &TimeoutTable {
        &self.timeouts
    }

    /// Screenshot hook
    #[must_use]
    pub const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Browser collaborator
    #[must_use]
    pub fn driver(&self) -> &Arc<dyn ElementDriver> {
        &self.driver
    }

    /// Wait for `locator` to reach `state`.
    ///
    /// `timeout` falls back to the per-state default. `Invisible` yields
    /// `Found(None)`; every other state yields the resolved handle.
    pub fn wait_for_state(
        &self,
        locator: &Locator,
        state: ElementState,
        timeout: Option<Duration>,
    ) -> WaitOutcome<Option<ElementHandle>> {
        let timeout = timeout.unwrap_or_else(|| self.timeouts.for_state(state));
        let window = self.window(locator, state, timeout);
        match window.outcome {
            WaitOutcome::Found(handle) => {
                debug!(
                    locator = %locator,
                    state = %state,
                    ticks = window.stats.ticks,
                    elapsed_ms = window.stats.elapsed.as_millis() as u64,
                    "element state reached"
                );
                WaitOutcome::Found(handle)
            }
            WaitOutcome::TimedOut => {
                warn!(
                    locator = %locator,
                    state = %state,
                    timeout_ms = timeout.as_millis() as u64,
                    elapsed_ms = window.stats.elapsed.as_millis() as u64,
                    last_error = ?window.last_error,
                    "element did not reach state before timeout"
                );
                let _ = self
                    .diagnostics
                    .capture_on_failure(&format!("timeout {state} {locator}"));
                WaitOutcome::TimedOut
            }
        }
    }

    /// Retry whole wait windows for elements that detach and reattach.
    ///
    /// Each attempt gets a fresh `timeout` window. A window that times out
    /// counts as a timeout failure, or as the stale-reference /
    /// click-intercepted error the driver last reported during it. Never
    /// raises: exhaustion is logged and returned as `TimedOut`.
    pub fn wait_for_state_with_retry(
        &self,
        locator: &Locator,
        state: ElementState,
        timeout: Option<Duration>,
        policy: &RetryPolicy,
    ) -> WaitOutcome<Option<ElementHandle>> {
        let timeout = timeout.unwrap_or_else(|| self.timeouts.for_state(state));
        let clock = self.poller.clock();
        let started = clock.now();
        let executor = RetryExecutor::with_clock(Arc::clone(clock));
        let windows = Cell::new(0u32);

        let result = executor.execute(
            || {
                windows.set(windows.get() + 1);
                self.attempt_window(locator, state, timeout)
            },
            policy,
        );
        match result {
            Ok(handle) => WaitOutcome::Found(handle),
            Err(err) => {
                let attempts = windows.get();
                warn!(
                    locator = %locator,
                    state = %state,
                    timeout_ms = timeout.as_millis() as u64,
                    attempts,
                    elapsed_ms = clock.since(started).as_millis() as u64,
                    error = %err,
                    "element did not reach state after retries"
                );
                let _ = self
                    .diagnostics
                    .capture_on_failure(&format!("retry timeout {state} {locator}"));
                WaitOutcome::TimedOut
            }
        }
    }

    /// Wait until the element's text contains `expected`; yields the full text
    pub fn wait_for_text(
        &self,
        locator: &Locator,
        expected: &str,
        timeout: Option<Duration>,
    ) -> WaitOutcome<String> {
        let timeout = timeout.unwrap_or(self.timeouts.visible);
        let (outcome, stats) = self.poller.poll_with_stats(
            || {
                let handle = self.driver.find_element(locator)?;
                let text = self.driver.text(&handle)?;
                Ok::<_, DriverError>(text.contains(expected).then_some(text))
            },
            timeout,
            None,
        );
        if outcome.is_timed_out() {
            self.report_timeout(
                &format!("text containing {expected:?}"),
                Some(locator),
                timeout,
                stats,
            );
        }
        outcome
    }

    /// Wait until attribute `name` equals `expected`
    pub fn wait_for_attribute(
        &self,
        locator: &Locator,
        name: &str,
        expected: &str,
        timeout: Option<Duration>,
    ) -> WaitOutcome<ElementHandle> {
        let timeout = timeout.unwrap_or(self.timeouts.present);
        let (outcome, stats) = self.poller.poll_with_stats(
            || {
                let handle = self.driver.find_element(locator)?;
                let value = self.driver.attribute(&handle, name)?;
                Ok::<_, DriverError>((value.as_deref() == Some(expected)).then_some(handle))
            },
            timeout,
            None,
        );
        if outcome.is_timed_out() {
            self.report_timeout(
                &format!("attribute {name}={expected:?}"),
                Some(locator),
                timeout,
                stats,
            );
        }
        outcome
    }

    /// Wait until `document.readyState` is `complete`
    pub fn wait_for_page_ready(&self, timeout: Option<Duration>) -> WaitOutcome<()> {
        let timeout = timeout.unwrap_or(self.timeouts.present);
        let (outcome, stats) = self.poller.poll_with_stats(
            || {
                let state = self.driver.execute_script(READY_STATE_SCRIPT, &[])?;
                Ok::<_, DriverError>((state.as_str() == Some("complete")).then_some(()))
            },
            timeout,
            None,
        );
        if outcome.is_timed_out() {
            self.report_timeout("page ready", None, timeout, stats);
        }
        outcome
    }

    /// Wait until exactly `count` elements match
    pub fn wait_for_count(
        &self,
        locator: &Locator,
        count: usize,
        timeout: Option<Duration>,
    ) -> WaitOutcome<Vec<ElementHandle>> {
        let timeout = timeout.unwrap_or(self.timeouts.present);
        let (outcome, stats) = self.poller.poll_with_stats(
            || {
                let handles = self.driver.find_elements(locator)?;
                Ok::<_, DriverError>((handles.len() == count).then_some(handles))
            },
            timeout,
            None,
        );
        if outcome.is_timed_out() {
            self.report_timeout(&format!("{count} matches"), Some(locator), timeout, stats);
        }
        outcome
    }

    fn report_timeout(
        &self,
        condition: &str,
        locator: Option<&Locator>,
        timeout: Duration,
        stats: PollStats,
    ) {
        let target = locator.map_or_else(|| "page".to_string(), ToString::to_string);
        warn!(
            locator = %target,
            condition,
            timeout_ms = timeout.as_millis() as u64,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "condition not met before timeout"
        );
        let _ = self
            .diagnostics
            .capture_on_failure(&format!("timeout {condition} {target}"));
    }

    fn window(&self, locator: &Locator, state: ElementState, timeout: Duration) -> Window {
        let mut last_error = None;
        let (outcome, stats) = self.poller.poll_with_stats(
            || {
                let probed = self.probe(locator, state);
                if let Err(ref err) = probed {
                    last_error = Some(err.clone());
                }
                probed
            },
            timeout,
            None,
        );
        Window {
            outcome,
            stats,
            last_error,
        }
    }

    fn attempt_window(
        &self,
        locator: &Locator,
        state: ElementState,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, DriverError> {
        let window = self.window(locator, state, timeout);
        match window.outcome {
            WaitOutcome::Found(Some(handle)) => {
                // the page may re-render between the probe and the caller's use
                let _ = self.driver.is_displayed(&handle)?;
                Ok(Some(handle))
            }
            WaitOutcome::Found(None) => Ok(None),
            WaitOutcome::TimedOut => {
                debug!(
                    locator = %locator,
                    state = %state,
                    elapsed_ms = window.stats.elapsed.as_millis() as u64,
                    "wait window timed out"
                );
                match window.last_error {
                    Some(
                        err @ (DriverError::StaleReference { .. }
                        | DriverError::ClickIntercepted { .. }),
                    ) => Err(err),
                    _ => Err(DriverError::Timeout {
                        message: format!("{locator} not {state} within {timeout:?}"),
                    }),
                }
            }
        }
    }

    fn probe(
        &self,
        locator: &Locator,
        state: ElementState,
    ) -> Result<Option<Option<ElementHandle>>, DriverError> {
        let driver = self.driver.as_ref();
        if state == ElementState::Invisible {
            return match driver.find_element(locator) {
                Err(DriverError::NotFound { .. } | DriverError::StaleReference { .. }) => {
                    Ok(Some(None))
                }
                Err(err) => Err(err),
                Ok(handle) => match driver.is_displayed(&handle) {
                    Ok(true) => Ok(None),
                    Ok(false) | Err(DriverError::StaleReference { .. }) => Ok(Some(None)),
                    Err(err) => Err(err),
                },
            };
        }

        let handle = driver.find_element(locator)?;
        let reached = match state {
            ElementState::Present => true,
            ElementState::Visible => driver.is_displayed(&handle)?,
            ElementState::Clickable => driver.is_displayed(&handle)? && driver.is_enabled(&handle)?,
            ElementState::Selected => driver.is_selected(&handle)?,
            ElementState::NotSelected => !driver.is_selected(&handle)?,
            ElementState::Invisible => !driver.is_displayed(&handle)?,
        };
        Ok(reached.then_some(Some(handle)))
    }
}
