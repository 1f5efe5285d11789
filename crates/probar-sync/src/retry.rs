//! Backoff-Governed Retries
//!
//! Wraps flaky operations (clicks on re-rendering elements, backend calls)
//! in a bounded attempt loop with exponential backoff and optional jitter.
//!
//! ```text
//! attempt 1 ──fail──► sleep base ──► attempt 2 ──fail──► sleep base·f ──► ...
//!    │                                   │
//!    └─ non-retryable: Failed(e) now     └─ last attempt: Exhausted / Failed(last)
//! ```
//!
//! Three invocation surfaces share one attempt core:
//!
//! - [`RetryExecutor::execute`] / [`retrying`]: higher-order, wraps a closure
//! - [`RetryScope`]: retries a multi-statement block inside a `loop`
//! - [`RetryExecutor::execute_until`]: retries on the *result*, never raises
//!
//! ## Example
//!
//! ```rust,ignore
//! let policy = RetryPolicy::builder().max_attempts(4).build()?;
//! let mut scope = retry_scope(&policy);
//! let handle = loop {
//!     let attempt = driver.find_element(&row).and_then(|h| {
//!         driver.is_enabled(&h)?;
//!         Ok(h)
//!     });
//!     if let Some(h) = scope.check(attempt)? {
//!         break h;
//!     }
//! };
//! ```

use crate::clock::{system_clock, SharedClock};
use crate::config::RetryDefaults;
use crate::result::{SyncError, SyncResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Lower bound of the jitter multiplier
pub const JITTER_LOW: f64 = 0.85;

/// Upper bound of the jitter multiplier
pub const JITTER_HIGH: f64 = 1.15;

/// Category of a failed attempt, matched against a policy's retryable set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Element handle detached from the document
    StaleReference,
    /// Interaction landed on another element
    ClickIntercepted,
    /// An operation or wait window ran out of time
    Timeout,
    /// Transient transport failure
    Network,
    /// Nothing matched a locator
    NotFound,
    /// Script evaluation failed
    Script,
    /// A check evaluated to false
    Assertion,
    /// Unclassified
    Other,
}

impl FailureKind {
    /// Kinds retried by [`RetryPolicy::default`]
    pub const CANONICAL_RETRYABLE: [Self; 3] =
        [Self::StaleReference, Self::ClickIntercepted, Self::Timeout];

    /// Snake-case name used in logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StaleReference => "stale_reference",
            Self::ClickIntercepted => "click_intercepted",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::NotFound => "not_found",
            Self::Script => "script",
            Self::Assertion => "assertion",
            Self::Other => "other",
        }
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps an error value onto a [`FailureKind`]
pub trait Classify {
    /// Category of this failure
    fn failure_kind(&self) -> FailureKind;
}

impl Classify for FailureKind {
    fn failure_kind(&self) -> FailureKind {
        *self
    }
}

impl Classify for std::io::Error {
    fn failure_kind(&self) -> FailureKind {
        use std::io::ErrorKind;
        match self.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => FailureKind::Timeout,
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected => FailureKind::Network,
            ErrorKind::NotFound => FailureKind::NotFound,
            _ => FailureKind::Other,
        }
    }
}

// =============================================================================
// POLICY
// =============================================================================

/// Immutable retry configuration.
///
/// Built through [`RetryPolicy::builder`] or derived from injected
/// [`RetryDefaults`]; `max_attempts` is always at least 1 and
/// `backoff_factor` at least 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    backoff_factor: f64,
    jitter: bool,
    retryable: BTreeSet<FailureKind>,
    raise_original: bool,
    operation: Option<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_defaults(&RetryDefaults::default())
    }
}

impl RetryPolicy {
    /// Start a builder from the fallback defaults
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// Start a builder from this policy, for per-call overrides
    #[must_use]
    pub fn to_builder(&self) -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: self.clone(),
        }
    }

    /// Derive a policy from injected defaults
    pub fn from_config(defaults: &RetryDefaults) -> SyncResult<Self> {
        RetryPolicyBuilder {
            policy: Self::from_defaults(defaults),
        }
        .build()
    }

    fn from_defaults(defaults: &RetryDefaults) -> Self {
        Self {
            max_attempts: defaults.max_attempts,
            base_delay: defaults.base_delay,
            backoff_factor: defaults.backoff_factor,
            jitter: defaults.jitter,
            retryable: FailureKind::CANONICAL_RETRYABLE.into_iter().collect(),
            raise_original: defaults.raise_original,
            operation: None,
        }
    }

    /// A single attempt; failures surface unchanged
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            raise_original: true,
            ..Self::default()
        }
    }

    /// Canonical retryable kinds plus transient network failures
    #[must_use]
    pub fn network() -> Self {
        let mut policy = Self::default();
        let _ = policy.retryable.insert(FailureKind::Network);
        policy
    }

    /// Same policy, labelled for logs and exhaustion errors
    #[must_use]
    pub fn named(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Attempts including the first
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the first retry
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Per-attempt multiplier
    #[must_use]
    pub const fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    /// Whether delays are jittered
    #[must_use]
    pub const fn jitter(&self) -> bool {
        self.jitter
    }

    /// Whether exhaustion surfaces the last underlying error
    #[must_use]
    pub const fn raise_original(&self) -> bool {
        self.raise_original
    }

    /// Kinds that trigger another attempt
    #[must_use]
    pub const fn retryable(&self) -> &BTreeSet<FailureKind> {
        &self.retryable
    }

    /// Operation label
    #[must_use]
    pub fn operation(&self) -> Option<&str> {
        self.operation.as_deref()
    }

    /// Whether `kind` triggers another attempt
    #[must_use]
    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Backoff slept after failed attempt `attempt` (1-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        compute_backoff(attempt, self.base_delay, self.backoff_factor, self.jitter)
    }
}

/// Builder for [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Attempts including the first
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.policy.max_attempts = attempts;
        self
    }

    /// Delay before the first retry
    #[must_use]
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay = delay;
        self
    }

    /// Per-attempt multiplier
    #[must_use]
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.policy.backoff_factor = factor;
        self
    }

    /// Enable or disable jitter
    #[must_use]
    pub fn jitter(mut self, enabled: bool) -> Self {
        self.policy.jitter = enabled;
        self
    }

    /// Surface the last underlying error on exhaustion
    #[must_use]
    pub fn raise_original(mut self, enabled: bool) -> Self {
        self.policy.raise_original = enabled;
        self
    }

    /// Also retry on `kind`
    #[must_use]
    pub fn retry_on(mut self, kind: FailureKind) -> Self {
        let _ = self.policy.retryable.insert(kind);
        self
    }

    /// Replace the retryable set
    #[must_use]
    pub fn retryable(mut self, kinds: impl IntoIterator<Item = FailureKind>) -> Self {
        self.policy.retryable = kinds.into_iter().collect();
        self
    }

    /// Label for logs and exhaustion errors
    #[must_use]
    pub fn operation(mut self, name: impl Into<String>) -> Self {
        self.policy.operation = Some(name.into());
        self
    }

    /// Validate and build
    pub fn build(self) -> SyncResult<RetryPolicy> {
        let policy = self.policy;
        if policy.max_attempts == 0 {
            return Err(SyncError::InvalidPolicy {
                message: "max_attempts must be at least 1".into(),
            });
        }
        if !policy.backoff_factor.is_finite() || policy.backoff_factor < 1.0 {
            return Err(SyncError::InvalidPolicy {
                message: format!(
                    "backoff_factor must be a finite value >= 1.0, got {}",
                    policy.backoff_factor
                ),
            });
        }
        Ok(policy)
    }
}

// =============================================================================
// BACKOFF
// =============================================================================

/// `base · factor^(attempt-1)`, scaled by a uniform `[0.85, 1.15]` sample when
/// `jitter` is set. Attempts are 1-based; attempt 0 is treated as 1.
#[must_use]
pub fn compute_backoff(attempt: u32, base: Duration, factor: f64, jitter: bool) -> Duration {
    compute_backoff_with(attempt, base, factor, jitter, &mut rand::rng())
}

/// [`compute_backoff`] with an explicit random source
pub fn compute_backoff_with<R: Rng + ?Sized>(
    attempt: u32,
    base: Duration,
    factor: f64,
    jitter: bool,
    rng: &mut R,
) -> Duration {
    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let mut nanos = base.as_nanos() as f64 * factor.powi(exponent);
    if jitter {
        nanos *= rng.random_range(JITTER_LOW..=JITTER_HIGH);
    }
    nanos_to_duration(nanos)
}

fn nanos_to_duration(nanos: f64) -> Duration {
    if nanos.is_nan() || nanos <= 0.0 {
        Duration::ZERO
    } else if nanos >= u64::MAX as f64 {
        Duration::from_nanos(u64::MAX)
    } else {
        Duration::from_nanos(nanos.round() as u64)
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// One failed attempt inside a single retried call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAttemptRecord {
    /// 1-based attempt index
    pub attempt: u32,
    /// When the failure was observed
    pub at: SystemTime,
    /// Classified failure
    pub kind: FailureKind,
    /// Rendered failure
    pub failure: String,
    /// Backoff slept afterwards, `None` for the final attempt
    pub delay: Option<Duration>,
}

/// Every attempt failed with a retryable error
#[derive(Debug, Clone)]
pub struct RetryExhausted<E> {
    /// Operation label from the policy
    pub operation: Option<String>,
    /// Attempts made (equals the policy's `max_attempts`)
    pub attempts: u32,
    /// Error from the final attempt
    pub last_cause: E,
    /// One record per failed attempt, in order
    pub records: Vec<RetryAttemptRecord>,
    /// Time from the first attempt to exhaustion
    pub elapsed: Duration,
}

impl<E: Display> Display for RetryExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref op) = self.operation {
            write!(f, "{op}: ")?;
        }
        write!(
            f,
            "retry exhausted after {} attempt(s) ({:.2}s): {}",
            self.attempts,
            self.elapsed.as_secs_f64(),
            self.last_cause
        )
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryExhausted<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last_cause)
    }
}

/// Terminal outcome of a retried call that did not succeed
#[derive(Debug, Clone)]
pub enum RetryError<E> {
    /// Non-retryable failure, or the last failure under `raise_original`
    Failed(E),
    /// Retry budget consumed
    Exhausted(RetryExhausted<E>),
}

impl<E> RetryError<E> {
    /// The underlying error
    pub const fn cause(&self) -> &E {
        match self {
            Self::Failed(err) => err,
            Self::Exhausted(exhausted) => &exhausted.last_cause,
        }
    }

    /// Consume into the underlying error
    pub fn into_cause(self) -> E {
        match self {
            Self::Failed(err) => err,
            Self::Exhausted(exhausted) => exhausted.last_cause,
        }
    }

    /// Whether the retry budget was consumed
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted(_))
    }

    /// Exhaustion details, if any
    pub const fn exhausted(&self) -> Option<&RetryExhausted<E>> {
        match self {
            Self::Failed(_) => None,
            Self::Exhausted(exhausted) => Some(exhausted),
        }
    }
}

impl<E: Display> Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(err) => Display::fmt(err, f),
            Self::Exhausted(exhausted) => Display::fmt(exhausted, f),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed(err) => err.source(),
            Self::Exhausted(exhausted) => Some(&exhausted.last_cause),
        }
    }
}

// =============================================================================
// ATTEMPT CORE
// =============================================================================

#[derive(Debug)]
struct AttemptLoop<'p> {
    policy: &'p RetryPolicy,
    clock: SharedClock,
    attempt: u32,
    started: Duration,
    records: Vec<RetryAttemptRecord>,
}

impl<'p> AttemptLoop<'p> {
    fn new(policy: &'p RetryPolicy, clock: SharedClock) -> Self {
        let started = clock.now();
        Self {
            policy,
            clock,
            attempt: 0,
            started,
            records: Vec::new(),
        }
    }

    fn operation(&self) -> &str {
        self.policy.operation().unwrap_or("operation")
    }

    fn begin(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    fn has_remaining(&self) -> bool {
        self.attempt < self.policy.max_attempts()
    }

    fn succeeded(&self) {
        if self.attempt > 1 {
            debug!(
                operation = self.operation(),
                attempts = self.attempt,
                elapsed_ms = self.clock.since(self.started).as_millis() as u64,
                "succeeded after retry"
            );
        }
    }

    fn push_record(&mut self, kind: FailureKind, failure: String, delay: Option<Duration>) {
        self.records.push(RetryAttemptRecord {
            attempt: self.attempt,
            at: SystemTime::now(),
            kind,
            failure,
            delay,
        });
    }

    fn back_off(&mut self, kind: FailureKind, failure: String) {
        let delay = self.policy.delay_for(self.attempt);
        debug!(
            operation = self.operation(),
            attempt = self.attempt,
            max_attempts = self.policy.max_attempts(),
            kind = %kind,
            delay_ms = delay.as_millis() as u64,
            failure = %failure,
            "attempt failed, backing off"
        );
        self.push_record(kind, failure, Some(delay));
        self.clock.sleep(delay);
    }

    /// `None` means go again; `Some` is the terminal outcome.
    fn fail<E: Classify + Display>(&mut self, err: E) -> Option<RetryError<E>> {
        let kind = err.failure_kind();
        if !self.policy.is_retryable(kind) {
            warn!(
                operation = self.operation(),
                attempt = self.attempt,
                kind = %kind,
                error = %err,
                "non-retryable failure"
            );
            return Some(RetryError::Failed(err));
        }
        if self.has_remaining() {
            self.back_off(kind, err.to_string());
            return None;
        }

        self.push_record(kind, err.to_string(), None);
        let elapsed = self.clock.since(self.started);
        warn!(
            operation = self.operation(),
            attempts = self.attempt,
            elapsed_ms = elapsed.as_millis() as u64,
            kind = %kind,
            error = %err,
            "retry exhausted"
        );
        if self.policy.raise_original() {
            return Some(RetryError::Failed(err));
        }
        Some(RetryError::Exhausted(RetryExhausted {
            operation: self.policy.operation().map(str::to_string),
            attempts: self.attempt,
            last_cause: err,
            records: std::mem::take(&mut self.records),
            elapsed,
        }))
    }
}

// =============================================================================
// EXECUTOR
// =============================================================================

/// Runs operations under a [`RetryPolicy`].
///
/// Holds only the clock; attempt state lives in each call.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    clock: SharedClock,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutor {
    /// Executor sleeping in real time
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Executor on an injected clock
    #[must_use]
    pub fn with_clock(clock: SharedClock) -> Self {
        Self { clock }
    }

    /// Clock used for backoff sleeps
    #[must_use]
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Run `operation` until it succeeds, fails non-retryably, or the
    /// attempt budget runs out.
    pub fn execute<T, E, F>(&self, mut operation: F, policy: &RetryPolicy) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify + Display,
    {
        let mut attempts = AttemptLoop::new(policy, self.clock.clone());
        loop {
            let _ = attempts.begin();
            match operation() {
                Ok(value) => {
                    attempts.succeeded();
                    return Ok(value);
                }
                Err(err) => {
                    if let Some(outcome) = attempts.fail(err) {
                        return Err(outcome);
                    }
                }
            }
        }
    }

    /// Re-run `operation` while `predicate` rejects its result.
    ///
    /// Returns the last result once the budget is spent; exhaustion is not
    /// an error here.
    pub fn execute_until<T, F, P>(&self, mut operation: F, mut predicate: P, policy: &RetryPolicy) -> T
    where
        F: FnMut() -> T,
        P: FnMut(&T) -> bool,
    {
        let mut attempts = AttemptLoop::new(policy, self.clock.clone());
        loop {
            let _ = attempts.begin();
            let result = operation();
            if predicate(&result) {
                attempts.succeeded();
                return result;
            }
            if !attempts.has_remaining() {
                debug!(
                    operation = attempts.operation(),
                    attempts = attempts.attempt,
                    "predicate never satisfied, returning last result"
                );
                return result;
            }
            attempts.back_off(FailureKind::Assertion, "predicate not satisfied".into());
        }
    }

    /// Scoped form for retrying a block; see [`RetryScope`]
    #[must_use]
    pub fn scope<'p>(&self, policy: &'p RetryPolicy) -> RetryScope<'p> {
        RetryScope {
            attempts: AttemptLoop::new(policy, self.clock.clone()),
        }
    }

    /// Wrap `f` so every call of the returned closure runs it under `policy`
    pub fn wrap<T, E, F>(&self, policy: RetryPolicy, mut f: F) -> impl FnMut() -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Classify + Display,
    {
        let executor = self.clone();
        move || executor.execute(&mut f, &policy)
    }
}

/// Wrap `f` in `policy` using the real-time clock
pub fn retrying<T, E, F>(policy: RetryPolicy, f: F) -> impl FnMut() -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    E: Classify + Display,
{
    RetryExecutor::new().wrap(policy, f)
}

/// Open a [`RetryScope`] on the real-time clock
#[must_use]
pub fn retry_scope(policy: &RetryPolicy) -> RetryScope<'_> {
    RetryExecutor::new().scope(policy)
}

/// Retries a multi-statement block.
///
/// Each pass of the enclosing `loop` hands its result to [`RetryScope::check`]:
/// `Ok(Some(v))` ends the loop, `Ok(None)` means the scope already slept and
/// the block should run again, `Err` is terminal.
#[derive(Debug)]
pub struct RetryScope<'p> {
    attempts: AttemptLoop<'p>,
}

impl RetryScope<'_> {
    /// Judge one pass of the block
    pub fn check<T, E>(&mut self, result: Result<T, E>) -> Result<Option<T>, RetryError<E>>
    where
        E: Classify + Display,
    {
        let _ = self.attempts.begin();
        match result {
            Ok(value) => {
                self.attempts.succeeded();
                Ok(Some(value))
            }
            Err(err) => match self.attempts.fail(err) {
                Some(outcome) => Err(outcome),
                None => Ok(None),
            },
        }
    }

    /// Passes judged so far
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.attempt
    }
}
