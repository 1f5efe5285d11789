//! Failure Diagnostics Hook
//!
//! Screenshot capture is owned by the harness. Waiters and soft assertions
//! only call it on terminal failure paths, and a capture that produces
//! nothing is logged and otherwise ignored.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Longest artifact name handed to a capture hook
const MAX_ARTIFACT_NAME_LEN: usize = 80;

/// Captures a diagnostic screenshot
pub trait ScreenshotCapture: Send + Sync {
    /// Save a screenshot named after `name`, returning its path when one was written
    fn capture(&self, name: &str) -> Option<PathBuf>;
}

/// Optional screenshot hook shared by waiters and collectors
#[derive(Clone, Default)]
pub struct Diagnostics {
    capture: Option<Arc<dyn ScreenshotCapture>>,
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("capture", &self.capture.is_some())
            .finish()
    }
}

impl Diagnostics {
    /// No capture hook
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Use `capture` on failure paths
    #[must_use]
    pub fn with_capture(capture: Arc<dyn ScreenshotCapture>) -> Self {
        Self {
            capture: Some(capture),
        }
    }

    /// Whether a hook is installed
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.capture.is_some()
    }

    /// Best-effort screenshot for a failure described by `context`
    pub fn capture_on_failure(&self, context: &str) -> Option<PathBuf> {
        let capture = self.capture.as_ref()?;
        let name = artifact_name(context);
        match capture.capture(&name) {
            Some(path) => {
                info!(artifact = %path.display(), "captured failure screenshot");
                Some(path)
            }
            None => {
                debug!(name = %name, "screenshot capture produced no artifact");
                None
            }
        }
    }
}

/// File-system friendly slug of `context`
#[must_use]
pub fn artifact_name(context: &str) -> String {
    let mut name = String::with_capacity(context.len().min(MAX_ARTIFACT_NAME_LEN));
    let mut pending_dash = false;
    for c in context.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !name.is_empty() {
                name.push('-');
            }
            pending_dash = false;
            name.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if name.len() >= MAX_ARTIFACT_NAME_LEN {
            break;
        }
    }
    if name.is_empty() {
        "failure".to_string()
    } else {
        name
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records requested names; returns a path unless told to fail
    #[derive(Debug, Default)]
    pub(crate) struct RecordingCapture {
        pub(crate) names: Mutex<Vec<String>>,
        pub(crate) fail: bool,
    }

    impl RecordingCapture {
        pub(crate) fn taken(&self) -> Vec<String> {
            self.names.lock().unwrap().clone()
        }
    }

    impl ScreenshotCapture for RecordingCapture {
        fn capture(&self, name: &str) -> Option<PathBuf> {
            self.names.lock().unwrap().push(name.to_string());
            (!self.fail).then(|| PathBuf::from(format!("/tmp/screenshots/{name}.png")))
        }
    }

    #[test]
    fn test_artifact_name_slug() {
        assert_eq!(
            artifact_name("timeout: submit button (css=#submit) clickable"),
            "timeout-submit-button-css-submit-clickable"
        );
        assert_eq!(artifact_name("  ***  "), "failure");
    }

    #[test]
    fn test_artifact_name_truncated() {
        let long = "a".repeat(500);
        assert_eq!(artifact_name(&long).len(), MAX_ARTIFACT_NAME_LEN);
    }

    #[test]
    fn test_disabled_never_captures() {
        let diagnostics = Diagnostics::disabled();
        assert!(!diagnostics.is_enabled());
        assert_eq!(diagnostics.capture_on_failure("anything"), None);
    }

    #[test]
    fn test_capture_passes_slug() {
        let recorder = Arc::new(RecordingCapture::default());
        let diagnostics = Diagnostics::with_capture(recorder.clone());
        let path = diagnostics.capture_on_failure("Login Form").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/screenshots/login-form.png"));
        assert_eq!(recorder.taken(), vec!["login-form".to_string()]);
    }

    #[test]
    fn test_failed_capture_is_none() {
        let recorder = Arc::new(RecordingCapture {
            fail: true,
            ..RecordingCapture::default()
        });
        let diagnostics = Diagnostics::with_capture(recorder);
        assert_eq!(diagnostics.capture_on_failure("x"), None);
    }
}
