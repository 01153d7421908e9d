use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::credentials::{CredentialBackend, MemoryCredentials, StoredToken};

struct SessionInner {
    backend: Box<dyn CredentialBackend>,
    current: RwLock<Option<StoredToken>>,
}

/// The signed-in state shared by every component that talks to the API.
///
/// A `Session` is an explicit context object: it is created once, cloned
/// into the `ApiClient` and the managers, and is the only place the token is
/// read or written. Presence of a token is the sole signal of being logged
/// in; tokens are never inspected or expired locally.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Open a session over `backend`, loading any previously stored token.
    /// A backend that fails to load starts the session logged out.
    pub fn open(backend: impl CredentialBackend + 'static) -> Self {
        let current = match backend.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, backend = %backend.describe(), "Failed to load stored token");
                None
            }
        };
        debug!(logged_in = current.is_some(), backend = %backend.describe(), "Session opened");
        Self {
            inner: Arc::new(SessionInner {
                backend: Box::new(backend),
                current: RwLock::new(current),
            }),
        }
    }

    /// A session that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::open(MemoryCredentials::new())
    }

    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|stored| stored.token.clone())
    }

    pub fn is_logged_in(&self) -> bool {
        self.read().is_some()
    }

    /// When the current token was stored
    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.read().as_ref().map(|stored| stored.saved_at)
    }

    /// Store a new token. The session only changes once the backend has
    /// persisted it; on failure the previous state is kept.
    pub fn set_token(&self, token: impl Into<String>) -> Result<()> {
        let stored = StoredToken::new(token);
        self.inner.backend.store(&stored)?;
        *self.write() = Some(stored);
        Ok(())
    }

    /// Forget the token, both in memory and in the backend. The in-memory
    /// token is dropped even when the backend fails to clear.
    pub fn clear(&self) -> Result<()> {
        *self.write() = None;
        self.inner.backend.clear()
    }

    pub fn backend_description(&self) -> String {
        self.inner.backend.describe()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<StoredToken>> {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<StoredToken>> {
        self.inner
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{FailingCredentials, FileCredentials};

    #[test]
    fn test_set_and_clear_token() {
        let session = Session::in_memory();
        assert!(!session.is_logged_in());
        assert_eq!(session.token(), None);

        session.set_token("abc").unwrap();
        assert!(session.is_logged_in());
        assert_eq!(session.token().as_deref(), Some("abc"));
        assert!(session.saved_at().is_some());

        session.clear().unwrap();
        assert!(!session.is_logged_in());
        assert_eq!(session.saved_at(), None);
    }

    #[test]
    fn test_clones_share_state() {
        let session = Session::in_memory();
        let other = session.clone();
        session.set_token("shared").unwrap();
        assert_eq!(other.token().as_deref(), Some("shared"));
        other.clear().unwrap();
        assert!(!session.is_logged_in());
    }

    #[test]
    fn test_open_loads_persisted_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        Session::open(FileCredentials::new(&path))
            .set_token("persisted")
            .unwrap();

        let reopened = Session::open(FileCredentials::new(&path));
        assert_eq!(reopened.token().as_deref(), Some("persisted"));
    }

    #[test]
    fn test_failed_store_keeps_previous_state() {
        let session = Session::open(FailingCredentials::failing_store());
        assert!(session.set_token("new").is_err());
        assert!(!session.is_logged_in());
        assert_eq!(session.token(), None);
    }

    #[test]
    fn test_failed_clear_still_logs_out_in_memory() {
        let session = Session::open(FailingCredentials::failing_clear("tok"));
        assert!(session.is_logged_in());

        assert!(session.clear().is_err());
        assert!(!session.is_logged_in());
    }

    #[test]
    fn test_open_with_corrupt_file_starts_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{ broken").unwrap();

        let session = Session::open(FileCredentials::new(&path));
        assert!(!session.is_logged_in());
    }
}
