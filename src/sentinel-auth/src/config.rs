//! Client configuration.
//!
//! Loaded from `$SENTINEL_HOME/config.toml`; every field is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::constants::{
    API_URL_ENV_VAR, CHECK_INTERVAL, DEFAULT_API_BASE_URL, DEFAULT_REQUEST_TIMEOUT, HOME_ENV_VAR,
    REFRESH_BUFFER, RENEWAL_WAIT,
};
use crate::coordinator::RenewalSettings;
use crate::error::ConfigError;
use crate::storage::{CredentialStore, FileBackend};

/// Where credentials are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// OS keychain; falls back to a file on platforms without one.
    #[default]
    Keyring,
    /// `credentials.json` in the Sentinel home, mode 0600.
    File,
    /// Process memory only.
    Memory,
    /// Nothing is persisted.
    Disabled,
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// API base URL; endpoint paths are appended to it.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default)]
    pub storage: StorageKind,

    /// Renew once the access credential expires within this many seconds.
    #[serde(default = "default_refresh_buffer_secs")]
    pub refresh_buffer_secs: u64,

    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// How long a rejected request waits on a renewal already in flight.
    #[serde(default = "default_renewal_wait_secs")]
    pub renewal_wait_secs: u64,

    /// Abandon a refresh call after this many seconds (unset = no limit).
    #[serde(default)]
    pub renewal_timeout_secs: Option<u64>,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_refresh_buffer_secs() -> u64 {
    REFRESH_BUFFER.as_secs()
}

fn default_check_interval_secs() -> u64 {
    CHECK_INTERVAL.as_secs()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_renewal_wait_secs() -> u64 {
    RENEWAL_WAIT.as_secs()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            storage: StorageKind::default(),
            refresh_buffer_secs: default_refresh_buffer_secs(),
            check_interval_secs: default_check_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            renewal_wait_secs: default_renewal_wait_secs(),
            renewal_timeout_secs: None,
        }
    }
}

impl AuthConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `config.toml` from the Sentinel home and apply environment overrides.
    pub fn load_default() -> Result<Self, ConfigError> {
        let mut config = Self::load(Self::default_path()?)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(sentinel_home()?.join("config.toml"))
    }

    /// Apply overrides from process environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides using `lookup` to read variables.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV_VAR).filter(|v| !v.trim().is_empty()) {
            debug!(url = %url, "API base URL overridden from environment");
            self.api_base_url = url.trim().to_string();
        }
    }

    /// Check that the API base URL is an absolute http(s) URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.api_base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
            _ => Err(ConfigError::InvalidUrl(self.api_base_url.clone())),
        }
    }

    pub fn renewal_settings(&self) -> RenewalSettings {
        RenewalSettings {
            refresh_buffer: Duration::from_secs(self.refresh_buffer_secs),
            check_interval: Duration::from_secs(self.check_interval_secs.max(1)),
            renewal_timeout: self.renewal_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn renewal_wait(&self) -> Duration {
        Duration::from_secs(self.renewal_wait_secs)
    }

    /// Build the credential store selected by `storage`, rooted at `home`.
    pub fn build_store(&self, home: &Path) -> CredentialStore {
        match self.storage {
            StorageKind::Keyring => keyring_store(home),
            StorageKind::File => CredentialStore::new(Arc::new(FileBackend::new(home))),
            StorageKind::Memory => CredentialStore::in_memory(),
            StorageKind::Disabled => CredentialStore::unavailable(),
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn keyring_store(_home: &Path) -> CredentialStore {
    CredentialStore::new(Arc::new(crate::storage::KeyringBackend::new()))
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn keyring_store(home: &Path) -> CredentialStore {
    debug!("No OS keychain on this platform, using file storage");
    CredentialStore::new(Arc::new(FileBackend::new(home)))
}

/// The Sentinel home directory: `$SENTINEL_HOME`, else `~/.sentinel`.
pub fn sentinel_home() -> Result<PathBuf, ConfigError> {
    if let Some(home) = std::env::var_os(HOME_ENV_VAR).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|home| home.join(".sentinel"))
        .ok_or(ConfigError::NoHome)
}
