//! Result and error types for Probar Sync.

use crate::driver::DriverError;
use crate::retry::{Classify, FailureKind};
use thiserror::Error;

/// Result type for Probar Sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by construction, configuration and collaborator calls.
///
/// Ordinary wait timeouts are not errors; see [`crate::WaitOutcome`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// Element state name not in the closed set
    #[error("Unknown element state '{value}' (expected one of: visible, clickable, present, invisible, selected, not_selected)")]
    UnknownElementState {
        /// Rejected input
        value: String,
    },

    /// Locator string could not be parsed
    #[error("Invalid locator '{value}': {message}")]
    InvalidLocator {
        /// Rejected input
        value: String,
        /// Error message
        message: String,
    },

    /// Retry policy violates its invariants
    #[error("Invalid retry policy: {message}")]
    InvalidPolicy {
        /// Error message
        message: String,
    },

    /// Configuration value is unusable
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// Session registry misuse
    #[error("Session error: {message}")]
    Session {
        /// Error message
        message: String,
    },

    /// Browser collaborator failure
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl Classify for SyncError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Driver(err) => err.failure_kind(),
            Self::Io(err) => err.failure_kind(),
            _ => FailureKind::Other,
        }
    }
}
