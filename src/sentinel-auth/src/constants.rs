//! Constants for the sentinel-auth crate.

use std::time::Duration;

/// Storage key for the access credential.
pub const ACCESS_TOKEN_KEY: &str = "sentinel_access_token";

/// Storage key for the refresh credential.
pub const REFRESH_TOKEN_KEY: &str = "sentinel_refresh_token";

/// Service name for keyring storage.
pub const KEYRING_SERVICE: &str = "sentinel";

/// Default API base URL. Endpoint paths are appended to it.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";

/// Environment variable overriding the API base URL.
pub const API_URL_ENV_VAR: &str = "SENTINEL_API_URL";

/// Environment variable overriding the Sentinel home directory.
pub const HOME_ENV_VAR: &str = "SENTINEL_HOME";

/// Renew when the access credential expires within this window.
pub const REFRESH_BUFFER: Duration = Duration::from_secs(120);

/// Cadence of the proactive expiry check.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// How long a request that hit a 401 waits for someone else's renewal.
pub const RENEWAL_WAIT: Duration = Duration::from_secs(10);

/// Default timeout for API requests.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Claim names carrying the session identifier, in lookup order.
pub const SESSION_ID_CLAIMS: &[&str] = &["sessionId", "session_id", "sid"];

/// User-Agent string for HTTP requests
pub const USER_AGENT: &str = concat!("sentinel/", env!("CARGO_PKG_VERSION"));
