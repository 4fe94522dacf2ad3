//! Sentinel Auth - credential lifecycle management for Sentinel clients.
//!
//! Owns the access/refresh credential pair used to talk to the Sentinel
//! session API:
//! - Decoding identity and expiry from access credentials
//! - Persisting credentials (OS keychain, permission-locked file, memory)
//! - Coalesced, proactive and reactive credential renewal
//! - Login, registration, logout and session bootstrap
//! - An HTTP transport that renews and retries once on 401

// Core modules
pub mod claims;
pub mod clock;
pub mod constants;
pub mod error;
pub mod models;

// Storage backends
pub mod storage;

// Remote API and transport
pub mod api;
mod http;
pub mod transport;

// Lifecycle
pub mod config;
pub mod coordinator;
pub mod navigation;
pub mod session;
pub mod state;

// Re-exports from claims
pub use claims::{DecodedClaims, decode};

// Re-exports from clock
pub use clock::{Clock, ManualClock, SystemClock};

// Re-exports from error
pub use error::{ApiError, AuthError, ConfigError, DecodeError, Result, StorageError};

// Re-exports from storage
pub use storage::{CredentialPair, CredentialStore, FileBackend, MemoryBackend, StorageBackend};

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
pub use storage::KeyringBackend;

// Re-exports from api
pub use api::{AuthApi, HttpAuthApi};

// Re-exports from transport
pub use transport::AuthorizedClient;

// Re-exports from lifecycle
pub use config::{AuthConfig, StorageKind, sentinel_home};
pub use coordinator::{ProactiveCheck, RenewOutcome, RenewalCoordinator, RenewalSettings, Subscription};
pub use navigation::{Destination, Navigator, NoopNavigator};
pub use session::SessionManager;
pub use state::{SessionPhase, SessionState};
