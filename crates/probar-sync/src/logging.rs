//! Log Subscriber Setup
//!
//! The library only emits `tracing` events. Test harnesses call [`init`]
//! once to print them; the filter comes from `PROBAR_SYNC_LOG`, then
//! `RUST_LOG`, then `info`.

use crate::result::SyncError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Filter variable checked before `RUST_LOG`
pub const LOG_ENV: &str = "PROBAR_SYNC_LOG";

/// Filter used when no variable is set
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Output format of the installed subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line human readable
    #[default]
    Compact,
    /// Newline-delimited JSON, for CI log collectors
    Json,
}

impl FromStr for LogFormat {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(SyncError::InvalidConfig {
                message: format!("unknown log format '{other}' (expected compact or json)"),
            }),
        }
    }
}

/// Filter from `PROBAR_SYNC_LOG`, `RUST_LOG`, or the default directive
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install a global subscriber; `false` if one was already installed
pub fn try_init(format: LogFormat) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false);
    let installed = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.is_ok()
}

/// Install a global subscriber, ignoring an existing one
pub fn init(format: LogFormat) {
    let _ = try_init(format);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_formats() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_second_init_is_not_an_error() {
        init(LogFormat::Compact);
        assert!(!try_init(LogFormat::Json));
        tracing::info!("still logging");
    }
}
