//! Scripted In-Memory Driver
//!
//! A [`MockDriver`] answers [`ElementDriver`] calls from a timeline of
//! element changes evaluated against a [`Clock`]. Paired with a
//! [`crate::FakeClock`] it lets page-object tests reproduce slow renders,
//! late enablement and detach/reattach cycles without a browser.
//!
//! ## Example
//!
//! ```rust,ignore
//! let clock = FakeClock::shared();
//! let driver = MockDriver::new(clock.clone()).with_element(
//!     MockElement::new(Locator::css("#submit")).enabled_at(Duration::from_secs(2)),
//! );
//! ```

use super::{DriverError, ElementDriver, ElementHandle};
use crate::clock::SharedClock;
use crate::locator::Locator;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Timeline of one scripted element
#[derive(Debug, Clone)]
pub struct MockElement {
    locator: Locator,
    tag_name: String,
    attached_at: Duration,
    detached_at: Option<Duration>,
    displayed_at: Option<Duration>,
    hidden_at: Option<Duration>,
    enabled_at: Option<Duration>,
    selected_at: Option<Duration>,
    reattached_at: Vec<Duration>,
    text: Vec<(Duration, String)>,
    attributes: Vec<(Duration, String, String)>,
}

impl MockElement {
    /// Element attached, displayed and enabled from time zero
    #[must_use]
    pub fn new(locator: Locator) -> Self {
        Self {
            locator,
            tag_name: "div".into(),
            attached_at: Duration::ZERO,
            detached_at: None,
            displayed_at: Some(Duration::ZERO),
            hidden_at: None,
            enabled_at: Some(Duration::ZERO),
            selected_at: None,
            reattached_at: Vec::new(),
            text: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Set the tag name reported on handles
    #[must_use]
    pub fn with_tag_name(mut self, tag: impl Into<String>) -> Self {
        self.tag_name = tag.into();
        self
    }

    /// Element enters the document at `at`
    #[must_use]
    pub fn attached_at(mut self, at: Duration) -> Self {
        self.attached_at = at;
        self
    }

    /// Element leaves the document at `at`
    #[must_use]
    pub fn detached_at(mut self, at: Duration) -> Self {
        self.detached_at = Some(at);
        self
    }

    /// Element becomes visible at `at`
    #[must_use]
    pub fn displayed_at(mut self, at: Duration) -> Self {
        self.displayed_at = Some(at);
        self
    }

    /// Element is in the document but never rendered
    #[must_use]
    pub fn never_displayed(mut self) -> Self {
        self.displayed_at = None;
        self
    }

    /// Element is hidden (still attached) from `at`
    #[must_use]
    pub fn hidden_at(mut self, at: Duration) -> Self {
        self.hidden_at = Some(at);
        self
    }

    /// Element becomes enabled at `at`
    #[must_use]
    pub fn enabled_at(mut self, at: Duration) -> Self {
        self.enabled_at = Some(at);
        self
    }

    /// Element is never enabled
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled_at = None;
        self
    }

    /// Element becomes selected at `at`
    #[must_use]
    pub fn selected_at(mut self, at: Duration) -> Self {
        self.selected_at = Some(at);
        self
    }

    /// The page re-renders the element at `at`; earlier handles go stale
    #[must_use]
    pub fn reattached_at(mut self, at: Duration) -> Self {
        self.reattached_at.push(at);
        self.reattached_at.sort();
        self
    }

    /// Text content from `at` onwards
    #[must_use]
    pub fn text_at(mut self, at: Duration, text: impl Into<String>) -> Self {
        self.text.push((at, text.into()));
        self.text.sort_by_key(|(t, _)| *t);
        self
    }

    /// Attribute value from `at` onwards
    #[must_use]
    pub fn attribute_at(
        mut self,
        at: Duration,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.attributes.push((at, name.into(), value.into()));
        self.attributes.sort_by_key(|(t, _, _)| *t);
        self
    }

    fn is_attached(&self, now: Duration) -> bool {
        now >= self.attached_at && self.detached_at.is_none_or(|at| now < at)
    }

    fn generation(&self, now: Duration) -> usize {
        self.reattached_at.iter().filter(|at| **at <= now).count()
    }

    fn is_displayed(&self, now: Duration) -> bool {
        self.displayed_at.is_some_and(|at| now >= at) && self.hidden_at.is_none_or(|at| now < at)
    }

    fn is_enabled(&self, now: Duration) -> bool {
        self.enabled_at.is_some_and(|at| now >= at)
    }

    fn is_selected(&self, now: Duration) -> bool {
        self.selected_at.is_some_and(|at| now >= at)
    }

    fn text(&self, now: Duration) -> String {
        self.text
            .iter()
            .rev()
            .find(|(at, _)| *at <= now)
            .map(|(_, text)| text.clone())
            .unwrap_or_default()
    }

    fn attribute(&self, now: Duration, name: &str) -> Option<String> {
        self.attributes
            .iter()
            .rev()
            .find(|(at, n, _)| *at <= now && n == name)
            .map(|(_, _, value)| value.clone())
    }
}

/// In-memory [`ElementDriver`] driven by element timelines
#[derive(Debug)]
pub struct MockDriver {
    clock: SharedClock,
    elements: Vec<MockElement>,
    ready_at: Duration,
    scripts: HashMap<String, Value>,
    queued_find_errors: Mutex<VecDeque<DriverError>>,
    find_calls: AtomicUsize,
}

impl MockDriver {
    /// Empty page, ready immediately
    #[must_use]
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            elements: Vec::new(),
            ready_at: Duration::ZERO,
            scripts: HashMap::new(),
            queued_find_errors: Mutex::new(VecDeque::new()),
            find_calls: AtomicUsize::new(0),
        }
    }

    /// Add a scripted element
    #[must_use]
    pub fn with_element(mut self, element: MockElement) -> Self {
        self.elements.push(element);
        self
    }

    /// `document.readyState` reports `complete` from `at`
    #[must_use]
    pub fn ready_at(mut self, at: Duration) -> Self {
        self.ready_at = at;
        self
    }

    /// Canned response for an exact script
    #[must_use]
    pub fn with_script_result(mut self, script: impl Into<String>, result: Value) -> Self {
        let _ = self.scripts.insert(script.into(), result);
        self
    }

    /// The next `find_element`/`find_elements` call fails with `error`
    pub fn queue_find_error(&self, error: DriverError) {
        self.queued_find_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Number of `find_element`/`find_elements` calls so far
    #[must_use]
    pub fn find_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
    }

    fn take_queued_error(&self) -> Option<DriverError> {
        self.queued_find_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    fn handle_for(&self, index: usize, element: &MockElement) -> ElementHandle {
        let generation = element.generation(self.clock.now());
        ElementHandle::new(format!("mock-{index}-{generation}"), element.locator.clone())
            .with_tag_name(element.tag_name.clone())
    }

    fn resolve(&self, handle: &ElementHandle) -> Result<&MockElement, DriverError> {
        let now = self.clock.now();
        let (index, generation) = parse_handle_id(&handle.id)
            .ok_or_else(|| DriverError::stale(format!("unknown handle {}", handle.id)))?;
        let element = self
            .elements
            .get(index)
            .ok_or_else(|| DriverError::stale(format!("unknown handle {}", handle.id)))?;
        if !element.is_attached(now) || element.generation(now) != generation {
            return Err(DriverError::stale(format!(
                "{} is no longer attached",
                handle.locator
            )));
        }
        Ok(element)
    }
}

fn parse_handle_id(id: &str) -> Option<(usize, usize)> {
    let mut parts = id.strip_prefix("mock-")?.split('-');
    let index = parts.next()?.parse().ok()?;
    let generation = parts.next()?.parse().ok()?;
    Some((index, generation))
}

impl ElementDriver for MockDriver {
    fn find_element(&self, locator: &Locator) -> Result<ElementHandle, DriverError> {
        self.find_elements(locator)?
            .into_iter()
            .next()
            .ok_or_else(|| DriverError::not_found(locator))
    }

    fn find_elements(&self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError> {
        let _ = self.find_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_queued_error() {
            return Err(err);
        }
        let now = self.clock.now();
        Ok(self
            .elements
            .iter()
            .enumerate()
            .filter(|(_, el)| el.locator == *locator && el.is_attached(now))
            .map(|(i, el)| self.handle_for(i, el))
            .collect())
    }

    fn is_displayed(&self, handle: &ElementHandle) -> Result<bool, DriverError> {
        let element = self.resolve(handle)?;
        Ok(element.is_displayed(self.clock.now()))
    }

    fn is_enabled(&self, handle: &ElementHandle) -> Result<bool, DriverError> {
        let element = self.resolve(handle)?;
        Ok(element.is_enabled(self.clock.now()))
    }

    fn is_selected(&self, handle: &ElementHandle) -> Result<bool, DriverError> {
        let element = self.resolve(handle)?;
        Ok(element.is_selected(self.clock.now()))
    }

    fn text(&self, handle: &ElementHandle) -> Result<String, DriverError> {
        let element = self.resolve(handle)?;
        Ok(element.text(self.clock.now()))
    }

    fn attribute(&self, handle: &ElementHandle, name: &str) -> Result<Option<String>, DriverError> {
        let element = self.resolve(handle)?;
        Ok(element.attribute(self.clock.now(), name))
    }

    fn execute_script(&self, script: &str, _args: &[Value]) -> Result<Value, DriverError> {
        if let Some(result) = self.scripts.get(script) {
            return Ok(result.clone());
        }
        if script.contains("document.readyState") {
            let state = if self.clock.now() >= self.ready_at {
                "complete"
            } else {
                "loading"
            };
            return Ok(Value::String(state.into()));
        }
        Ok(Value::Null)
    }
}
