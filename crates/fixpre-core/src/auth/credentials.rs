use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};

/// Keychain service name
const SERVICE_NAME: &str = "fixpre";

/// Fixed storage key the token is kept under
pub const TOKEN_KEY: &str = "jwt_token";

/// The persisted credential: the bearer token and when it was saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    #[serde(rename = "jwt_token")]
    pub token: String,
    pub saved_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            saved_at: Utc::now(),
        }
    }
}

/// Somewhere a single token can be read, written and cleared.
pub trait CredentialBackend: Send + Sync {
    fn load(&self) -> Result<Option<StoredToken>>;
    fn store(&self, token: &StoredToken) -> Result<()>;
    /// Clearing an empty store is not an error.
    fn clear(&self) -> Result<()>;
    fn describe(&self) -> String;
}

/// Token kept in a JSON file (`session.json` in the cache directory).
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialBackend for FileCredentials {
    fn load(&self) -> Result<Option<StoredToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .context("Failed to read session file")?;
        let stored: StoredToken = serde_json::from_str(&contents)
            .context("Failed to parse session file")?;
        Ok(Some(stored))
    }

    fn store(&self, token: &StoredToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create session directory")?;
        }
        let contents = serde_json::to_string_pretty(token)?;
        std::fs::write(&self.path, contents).context("Failed to write session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove session file")?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Token kept in the OS keychain.
pub struct KeyringCredentials;

impl KeyringCredentials {
    fn entry() -> Result<Entry> {
        Entry::new(SERVICE_NAME, TOKEN_KEY).context("Failed to create keyring entry")
    }
}

impl CredentialBackend for KeyringCredentials {
    fn load(&self) -> Result<Option<StoredToken>> {
        match Self::entry()?.get_password() {
            Ok(secret) => {
                let stored = serde_json::from_str(&secret)
                    .context("Failed to parse token from keychain")?;
                Ok(Some(stored))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn store(&self, token: &StoredToken) -> Result<()> {
        let secret = serde_json::to_string(token)?;
        Self::entry()?
            .set_password(&secret)
            .context("Failed to store token in keychain")
    }

    fn clear(&self) -> Result<()> {
        match Self::entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }

    fn describe(&self) -> String {
        "OS keychain".to_string()
    }
}

/// Process-local token that is never persisted.
#[derive(Default)]
pub struct MemoryCredentials {
    token: Mutex<Option<StoredToken>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialBackend for MemoryCredentials {
    fn load(&self) -> Result<Option<StoredToken>> {
        Ok(self
            .token
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory credential lock poisoned"))?
            .clone())
    }

    fn store(&self, token: &StoredToken) -> Result<()> {
        *self
            .token
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory credential lock poisoned"))? = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self
            .token
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory credential lock poisoned"))? = None;
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

/// Backend whose writes can be made to fail, for exercising error paths.
#[cfg(test)]
pub(crate) struct FailingCredentials {
    fail_store: bool,
    fail_clear: bool,
    token: Mutex<Option<StoredToken>>,
}

#[cfg(test)]
impl FailingCredentials {
    /// Starts empty; every `store` fails.
    pub(crate) fn failing_store() -> Self {
        Self {
            fail_store: true,
            fail_clear: false,
            token: Mutex::new(None),
        }
    }

    /// Starts holding `token`; every `clear` fails.
    pub(crate) fn failing_clear(token: &str) -> Self {
        Self {
            fail_store: false,
            fail_clear: true,
            token: Mutex::new(Some(StoredToken::new(token))),
        }
    }
}

#[cfg(test)]
impl CredentialBackend for FailingCredentials {
    fn load(&self) -> Result<Option<StoredToken>> {
        Ok(self.token.lock().unwrap().clone())
    }

    fn store(&self, token: &StoredToken) -> Result<()> {
        if self.fail_store {
            anyhow::bail!("disk full");
        }
        *self.token.lock().unwrap() = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.fail_clear {
            anyhow::bail!("keychain locked");
        }
        *self.token.lock().unwrap() = None;
        Ok(())
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}
