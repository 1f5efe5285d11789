//! Browser Collaborator Interface
//!
//! The synchronization layer never drives a browser itself. It consumes an
//! [`ElementDriver`], treating every call as fallible and possibly slow.
//!
//! ```text
//! ┌──────────────────────────┐       ┌───────────────────────────────┐
//! │ ElementStateWaiter       │──────►│ ElementDriver (trait)         │
//! │ ConditionPoller          │       │  find_element / is_displayed  │
//! └──────────────────────────┘       │  is_enabled / is_selected     │
//!                                    │  text / attribute / script    │
//!                                    └──────────────┬────────────────┘
//!                                          ┌────────┴─────────┐
//!                                          │ CDP / WebDriver  │  MockDriver
//!                                          └──────────────────┘
//! ```

pub mod mock;

use crate::locator::Locator;
use crate::retry::{Classify, FailureKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a browser collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// No element matched the locator
    #[error("no element matches {locator}")]
    NotFound {
        /// Locator that failed to resolve
        locator: String,
    },

    /// Handle refers to an element no longer attached to the document
    #[error("stale element reference: {message}")]
    StaleReference {
        /// Error message
        message: String,
    },

    /// Another element would receive the interaction
    #[error("click intercepted: {message}")]
    ClickIntercepted {
        /// Error message
        message: String,
    },

    /// The driver call itself timed out
    #[error("driver call timed out: {message}")]
    Timeout {
        /// Error message
        message: String,
    },

    /// Transport-level failure talking to the browser or a backend
    #[error("network error: {message}")]
    Network {
        /// Error message
        message: String,
    },

    /// Script evaluation failed
    #[error("script error: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// Anything else
    #[error("driver error: {message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl DriverError {
    /// Shorthand for a not-found error on `locator`
    #[must_use]
    pub fn not_found(locator: &Locator) -> Self {
        Self::NotFound {
            locator: locator.to_string(),
        }
    }

    /// Shorthand for a stale reference error
    #[must_use]
    pub fn stale(message: impl Into<String>) -> Self {
        Self::StaleReference {
            message: message.into(),
        }
    }
}

impl Classify for DriverError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::StaleReference { .. } => FailureKind::StaleReference,
            Self::ClickIntercepted { .. } => FailureKind::ClickIntercepted,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Network { .. } => FailureKind::Network,
            Self::Script { .. } => FailureKind::Script,
            Self::Other { .. } => FailureKind::Other,
        }
    }
}

/// Reference to a located element.
///
/// A handle may go stale if the page re-renders; collaborators report that
/// as [`DriverError::StaleReference`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Driver-assigned identifier
    pub id: String,
    /// Locator the handle was resolved from
    pub locator: Locator,
    /// Element tag name, when the driver reports it
    pub tag_name: Option<String>,
}

impl ElementHandle {
    /// Create a new element handle
    #[must_use]
    pub fn new(id: impl Into<String>, locator: Locator) -> Self {
        Self {
            id: id.into(),
            locator,
            tag_name: None,
        }
    }

    /// Set the tag name
    #[must_use]
    pub fn with_tag_name(mut self, tag: impl Into<String>) -> Self {
        self.tag_name = Some(tag.into());
        self
    }
}

/// Browser-driving collaborator consumed by the waiters.
pub trait ElementDriver: Send + Sync {
    /// Resolve the first element matching `locator`
    fn find_element(&self, locator: &Locator) -> Result<ElementHandle, DriverError>;

    /// Resolve every element matching `locator` (empty when none)
    fn find_elements(&self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError>;

    /// Whether the element is rendered and visible
    fn is_displayed(&self, handle: &ElementHandle) -> Result<bool, DriverError>;

    /// Whether the element accepts interaction
    fn is_enabled(&self, handle: &ElementHandle) -> Result<bool, DriverError>;

    /// Whether a checkbox/option/radio is selected
    fn is_selected(&self, handle: &ElementHandle) -> Result<bool, DriverError>;

    /// Rendered text content
    fn text(&self, handle: &ElementHandle) -> Result<String, DriverError>;

    /// Attribute value, `None` when absent
    fn attribute(&self, handle: &ElementHandle, name: &str) -> Result<Option<String>, DriverError>;

    /// Evaluate JavaScript in the page
    fn execute_script(
        &self,
        script: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value, DriverError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        let cases = [
            (DriverError::not_found(&Locator::id("x")), FailureKind::NotFound),
            (DriverError::stale("gone"), FailureKind::StaleReference),
            (
                DriverError::ClickIntercepted {
                    message: "overlay".into(),
                },
                FailureKind::ClickIntercepted,
            ),
            (
                DriverError::Timeout {
                    message: "slow".into(),
                },
                FailureKind::Timeout,
            ),
            (
                DriverError::Network {
                    message: "reset".into(),
                },
                FailureKind::Network,
            ),
            (
                DriverError::Script {
                    message: "ReferenceError".into(),
                },
                FailureKind::Script,
            ),
            (
                DriverError::Other {
                    message: "?".into(),
                },
                FailureKind::Other,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(err.failure_kind(), kind, "{err}");
        }
    }

    #[test]
    fn test_not_found_mentions_locator() {
        let err = DriverError::not_found(&Locator::css("#submit"));
        assert_eq!(err.to_string(), "no element matches css=#submit");
    }

    #[test]
    fn test_handle_builder() {
        let handle = ElementHandle::new("e1", Locator::id("go")).with_tag_name("button");
        assert_eq!(handle.tag_name.as_deref(), Some("button"));
        assert_eq!(handle.locator, Locator::id("go"));
    }
}
