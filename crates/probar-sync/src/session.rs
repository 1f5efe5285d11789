//! Browser Session Registry
//!
//! The harness registers each browser session it creates and quits them all
//! at teardown. The registry is an explicit object injected where needed;
//! nothing in this crate keeps sessions in global state.

use crate::driver::DriverError;
use crate::result::{SyncError, SyncResult};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// A live browser session owned by the harness
pub trait Session: Send {
    /// Unique session identifier
    fn id(&self) -> &str;

    /// Close the browser session
    fn quit(&mut self) -> Result<(), DriverError>;
}

/// Thread-safe set of active sessions keyed by id
#[derive(Debug)]
pub struct SessionRegistry<S> {
    sessions: Mutex<BTreeMap<String, S>>,
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self {
            sessions: Mutex::new(BTreeMap::new()),
        }
    }
}

impl<S: Session> SessionRegistry<S> {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, S>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `session`; ids must be unique
    pub fn register(&self, session: S) -> SyncResult<()> {
        let id = session.id().to_string();
        let mut sessions = self.lock();
        if sessions.contains_key(&id) {
            return Err(SyncError::Session {
                message: format!("session '{id}' is already registered"),
            });
        }
        debug!(session = %id, "registered session");
        let _ = sessions.insert(id, session);
        Ok(())
    }

    /// Stop tracking a session and hand it back
    pub fn deregister(&self, id: &str) -> Option<S> {
        let removed = self.lock().remove(id);
        if removed.is_some() {
            debug!(session = %id, "deregistered session");
        }
        removed
    }

    /// Run `f` against a registered session
    pub fn with_session<R>(&self, id: &str, f: impl FnOnce(&mut S) -> R) -> Option<R> {
        self.lock().get_mut(id).map(f)
    }

    /// Deregister and quit one session; `Ok(false)` when the id is unknown
    pub fn quit(&self, id: &str) -> Result<bool, DriverError> {
        match self.deregister(id) {
            Some(mut session) => session.quit().map(|()| true),
            None => Ok(false),
        }
    }

    /// Quit every session, returning the ones that failed to close.
    ///
    /// All sessions are removed from the registry whether or not they quit
    /// cleanly.
    pub fn quit_all(&self) -> Vec<(String, DriverError)> {
        let sessions = std::mem::take(&mut *self.lock());
        let total = sessions.len();
        let mut failures = Vec::new();
        for (id, mut session) in sessions {
            if let Err(err) = session.quit() {
                warn!(session = %id, error = %err, "session failed to quit");
                failures.push((id, err));
            }
        }
        info!(total, failed = failures.len(), "quit all sessions");
        failures
    }

    /// Number of registered sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no session is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Registered ids, sorted
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}
