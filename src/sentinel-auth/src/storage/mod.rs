//! Credential persistence.
//!
//! [`CredentialStore`] keeps the access and refresh credentials under two fixed
//! keys of a [`StorageBackend`]. It does no validation of token content. A
//! store without a backend silently drops writes and reads as empty, which is
//! how contexts with no durable storage behave.

mod file;
#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
mod keychain;
mod memory;

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::sync::Arc;

use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::error::StorageError;

pub use file::FileBackend;
#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
pub use keychain::KeyringBackend;
pub use memory::MemoryBackend;

/// Key-value persistence used by [`CredentialStore`].
pub trait StorageBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// An access credential together with its refresh credential.
pub struct CredentialPair {
    access_token: SecretString,
    refresh_token: SecretString,
}

impl CredentialPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: SecretString::from(refresh_token.into()),
        }
    }

    /// The access credential (exposes the secret - use sparingly).
    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// The refresh credential (exposes the secret - use sparingly).
    pub fn refresh_token(&self) -> &str {
        self.refresh_token.expose_secret()
    }
}

impl Clone for CredentialPair {
    fn clone(&self) -> Self {
        Self::new(self.access_token(), self.refresh_token())
    }
}

impl PartialEq for CredentialPair {
    fn eq(&self, other: &Self) -> bool {
        self.access_token() == other.access_token() && self.refresh_token() == other.refresh_token()
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Persistent home of the current credential pair.
#[derive(Clone)]
pub struct CredentialStore {
    backend: Option<Arc<dyn StorageBackend>>,
}

impl CredentialStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A store with nowhere to persist: writes are dropped, reads are empty.
    pub fn unavailable() -> Self {
        Self { backend: None }
    }

    /// In-memory store, mostly for tests.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::default()))
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Both credentials, if both are present.
    pub fn get(&self) -> Option<CredentialPair> {
        let access = self.access_token()?;
        let refresh = self.refresh_token()?;
        Some(CredentialPair::new(access, refresh))
    }

    pub fn access_token(&self) -> Option<String> {
        self.read(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read(REFRESH_TOKEN_KEY)
    }

    pub fn set_access(&self, token: &str) -> Result<(), StorageError> {
        self.write(ACCESS_TOKEN_KEY, token)
    }

    pub fn set_refresh(&self, token: &str) -> Result<(), StorageError> {
        self.write(REFRESH_TOKEN_KEY, token)
    }

    /// Write both credentials. On failure nothing is left behind.
    pub fn set_pair(&self, pair: &CredentialPair) -> Result<(), StorageError> {
        let result = self
            .set_access(pair.access_token())
            .and_then(|()| self.set_refresh(pair.refresh_token()));
        if let Err(e) = &result {
            tracing::warn!(error = %e, "Failed to persist credentials, clearing partial write");
            self.clear();
        }
        result
    }

    /// Remove both credentials. Backend failures are logged, not returned.
    pub fn clear(&self) {
        let Some(backend) = &self.backend else {
            return;
        };
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = backend.remove(key) {
                tracing::warn!(
                    backend = backend.name(),
                    key,
                    error = %e,
                    "Failed to remove credential"
                );
            }
        }
        tracing::debug!(backend = backend.name(), "Cleared stored credentials");
    }

    fn read(&self, key: &str) -> Option<String> {
        let backend = self.backend.as_ref()?;
        match backend.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::debug!(backend = backend.name(), key, error = %e, "Credential read failed");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let Some(backend) = &self.backend else {
            return Ok(());
        };
        backend.set(key, value)?;
        tracing::debug!(backend = backend.name(), key, size = value.len(), "Stored credential");
        Ok(())
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .finish()
    }
}
