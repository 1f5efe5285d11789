//! Locators: immutable strategy + value pairs identifying page elements.
//!
//! Locators are owned by page objects and locator catalogs. Nothing in this
//! crate mutates one; waiters and drivers only read them.

use crate::result::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Strategy used to resolve a locator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum By {
    /// CSS selector (e.g., "button.primary")
    Css,
    /// XPath expression
    XPath,
    /// Element `id` attribute
    Id,
    /// Element `name` attribute
    Name,
    /// Test ID selector (data-testid attribute)
    TestId,
    /// Visible text content (substring match)
    Text,
    /// Exact anchor text
    LinkText,
    /// Tag name
    TagName,
}

impl By {
    /// Short name used in `strategy=value` notation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::XPath => "xpath",
            Self::Id => "id",
            Self::Name => "name",
            Self::TestId => "test_id",
            Self::Text => "text",
            Self::LinkText => "link_text",
            Self::TagName => "tag",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "css" => Some(Self::Css),
            "xpath" => Some(Self::XPath),
            "id" => Some(Self::Id),
            "name" => Some(Self::Name),
            "test_id" | "testid" | "data-testid" => Some(Self::TestId),
            "text" => Some(Self::Text),
            "link_text" | "link" => Some(Self::LinkText),
            "tag" | "tag_name" => Some(Self::TagName),
            _ => None,
        }
    }
}

impl fmt::Display for By {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies zero or more elements on the page.
///
/// Two locators are equal when strategy and value match; the description
/// is only a display label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Locator {
    by: By,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl Locator {
    /// Create a locator from a strategy and value
    #[must_use]
    pub fn new(by: By, value: impl Into<String>) -> Self {
        Self {
            by,
            value: value.into(),
            description: None,
        }
    }

    /// CSS selector locator
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(By::Css, selector)
    }

    /// XPath locator
    #[must_use]
    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::new(By::XPath, expression)
    }

    /// `id` attribute locator
    #[must_use]
    pub fn id(id: impl Into<String>) -> Self {
        Self::new(By::Id, id)
    }

    /// `name` attribute locator
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::new(By::Name, name)
    }

    /// `data-testid` locator
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::new(By::TestId, id)
    }

    /// Text content locator
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(By::Text, text)
    }

    /// Anchor text locator
    #[must_use]
    pub fn link_text(text: impl Into<String>) -> Self {
        Self::new(By::LinkText, text)
    }

    /// Tag name locator
    #[must_use]
    pub fn tag_name(tag: impl Into<String>) -> Self {
        Self::new(By::TagName, tag)
    }

    /// Attach a human-readable name used in logs
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Resolution strategy
    #[must_use]
    pub const fn by(&self) -> By {
        self.by
    }

    /// Selector value
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Optional human-readable name
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl PartialEq for Locator {
    fn eq(&self, other: &Self) -> bool {
        self.by == other.by && self.value == other.value
    }
}

impl Eq for Locator {}

impl Hash for Locator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.by.hash(state);
        self.value.hash(state);
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "{desc} ({}={})", self.by, self.value),
            None => write!(f, "{}={}", self.by, self.value),
        }
    }
}

/// Parses `strategy=value` notation, as used by locator catalogs.
impl FromStr for Locator {
    type Err = SyncError;

    fn from_str(s: &str) -> SyncResult<Self> {
        let (strategy, value) = s.split_once('=').ok_or_else(|| SyncError::InvalidLocator {
            value: s.to_string(),
            message: "expected 'strategy=value'".into(),
        })?;
        let by = By::parse(strategy).ok_or_else(|| SyncError::InvalidLocator {
            value: s.to_string(),
            message: format!("unknown strategy '{}'", strategy.trim()),
        })?;
        if value.is_empty() {
            return Err(SyncError::InvalidLocator {
                value: s.to_string(),
                message: "empty selector value".into(),
            });
        }
        Ok(Self::new(by, value))
    }
}
