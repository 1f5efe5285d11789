//! Injected Defaults for Waits and Retries
//!
//! Timeouts, polling cadence and retry budgets are never hard-coded at call
//! sites. A [`SyncConfig`] is built once by the harness (from YAML, JSON or
//! environment variables) and handed to waiters and executors.
//!
//! Durations are written as milliseconds:
//!
//! ```yaml
//! poll_interval_ms: 250
//! timeouts:
//!   clickable_ms: 20000
//! retry:
//!   max_attempts: 5
//!   jitter: false
//! ```

use crate::element_wait::ElementState;
use crate::result::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Fallback poll interval (500ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Fallback timeout for render-bound states: visible, present, selected (10 seconds)
pub const DEFAULT_RENDER_TIMEOUT_MS: u64 = 10_000;

/// Fallback timeout for clickable, which waits on network-bound enablement (15 seconds)
pub const DEFAULT_CLICKABLE_TIMEOUT_MS: u64 = 15_000;

/// Fallback timeout for disappearance (10 seconds)
pub const DEFAULT_INVISIBLE_TIMEOUT_MS: u64 = 10_000;

/// Fallback retry attempt count
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Fallback base delay before the first retry (500ms)
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Fallback backoff multiplier
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "PROBAR_SYNC_";

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Default wait timeout per element state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutTable {
    /// Visible
    #[serde(rename = "visible_ms", with = "duration_ms")]
    pub visible: Duration,
    /// Clickable (visible + enabled)
    #[serde(rename = "clickable_ms", with = "duration_ms")]
    pub clickable: Duration,
    /// Present in the document
    #[serde(rename = "present_ms", with = "duration_ms")]
    pub present: Duration,
    /// Absent or hidden
    #[serde(rename = "invisible_ms", with = "duration_ms")]
    pub invisible: Duration,
    /// Selected / not selected
    #[serde(rename = "selected_ms", with = "duration_ms")]
    pub selected: Duration,
}

impl Default for TimeoutTable {
    fn default() -> Self {
        Self {
            visible: Duration::from_millis(DEFAULT_RENDER_TIMEOUT_MS),
            clickable: Duration::from_millis(DEFAULT_CLICKABLE_TIMEOUT_MS),
            present: Duration::from_millis(DEFAULT_RENDER_TIMEOUT_MS),
            invisible: Duration::from_millis(DEFAULT_INVISIBLE_TIMEOUT_MS),
            selected: Duration::from_millis(DEFAULT_RENDER_TIMEOUT_MS),
        }
    }
}

impl TimeoutTable {
    /// Default timeout for `state`
    #[must_use]
    pub const fn for_state(&self, state: ElementState) -> Duration {
        match state {
            ElementState::Visible => self.visible,
            ElementState::Clickable => self.clickable,
            ElementState::Present => self.present,
            ElementState::Invisible => self.invisible,
            ElementState::Selected | ElementState::NotSelected => self.selected,
        }
    }

    /// Every state with the same timeout
    #[must_use]
    pub const fn uniform(timeout: Duration) -> Self {
        Self {
            visible: timeout,
            clickable: timeout,
            present: timeout,
            invisible: timeout,
            selected: timeout,
        }
    }
}

/// Process-wide retry defaults; each call may still override them
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryDefaults {
    /// Attempts including the first (>= 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,
    /// Multiplier applied per attempt (>= 1.0)
    pub backoff_factor: f64,
    /// Scale each delay by a random factor in [0.85, 1.15]
    pub jitter: bool,
    /// Surface the last underlying error instead of `RetryExhausted`
    pub raise_original: bool,
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            jitter: true,
            raise_original: false,
        }
    }
}

/// Synchronization configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Per-state wait timeouts
    pub timeouts: TimeoutTable,
    /// Interval between poll ticks
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
    /// Retry defaults
    pub retry: RetryDefaults,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutTable::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            retry: RetryDefaults::default(),
        }
    }
}

impl SyncConfig {
    /// Create config with fallback defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Replace the timeout table
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: TimeoutTable) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Replace the retry defaults
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryDefaults) -> Self {
        self.retry = retry;
        self
    }

    /// Parse from YAML; missing keys keep their defaults
    pub fn from_yaml_str(yaml: &str) -> SyncResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()
    }

    /// Parse from JSON; missing keys keep their defaults
    pub fn from_json_str(json: &str) -> SyncResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()
    }

    /// Load a YAML (or `.json`) file
    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    /// Apply `PROBAR_SYNC_*` environment overrides
    pub fn with_env_overrides(self) -> SyncResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (keys include [`ENV_PREFIX`])
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> SyncResult<Self> {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = get("POLL_INTERVAL_MS") {
            self.poll_interval = parse_millis("POLL_INTERVAL_MS", &v)?;
        }
        let timeouts = [
            ("TIMEOUT_VISIBLE_MS", &mut self.timeouts.visible),
            ("TIMEOUT_CLICKABLE_MS", &mut self.timeouts.clickable),
            ("TIMEOUT_PRESENT_MS", &mut self.timeouts.present),
            ("TIMEOUT_INVISIBLE_MS", &mut self.timeouts.invisible),
            ("TIMEOUT_SELECTED_MS", &mut self.timeouts.selected),
        ];
        for (name, slot) in timeouts {
            if let Some(v) = get(name) {
                *slot = parse_millis(name, &v)?;
            }
        }
        if let Some(v) = get("RETRY_ATTEMPTS") {
            self.retry.max_attempts = v.trim().parse().map_err(|_| invalid("RETRY_ATTEMPTS", &v))?;
        }
        if let Some(v) = get("RETRY_BASE_DELAY_MS") {
            self.retry.base_delay = parse_millis("RETRY_BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = get("RETRY_FACTOR") {
            self.retry.backoff_factor = v.trim().parse().map_err(|_| invalid("RETRY_FACTOR", &v))?;
        }
        if let Some(v) = get("RETRY_JITTER") {
            self.retry.jitter = parse_bool("RETRY_JITTER", &v)?;
        }
        if let Some(v) = get("RETRY_RAISE_ORIGINAL") {
            self.retry.raise_original = parse_bool("RETRY_RAISE_ORIGINAL", &v)?;
        }
        self.validate()
    }

    /// Check invariants shared by every loader
    pub fn validate(self) -> SyncResult<Self> {
        if self.poll_interval.is_zero() {
            return Err(SyncError::InvalidConfig {
                message: "poll_interval_ms must be greater than zero".into(),
            });
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::InvalidConfig {
                message: "retry.max_attempts must be at least 1".into(),
            });
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 1.0 {
            return Err(SyncError::InvalidConfig {
                message: format!(
                    "retry.backoff_factor must be >= 1.0, got {}",
                    self.retry.backoff_factor
                ),
            });
        }
        Ok(self)
    }
}

fn invalid(name: &str, value: &str) -> SyncError {
    SyncError::InvalidConfig {
        message: format!("{ENV_PREFIX}{name}: cannot parse '{value}'"),
    }
}

fn parse_millis(name: &str, value: &str) -> SyncResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| invalid(name, value))
}

fn parse_bool(name: &str, value: &str) -> SyncResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, value)),
    }
}
