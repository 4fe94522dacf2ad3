//! Error types for credential lifecycle operations.

use thiserror::Error;

/// Failure to read claims out of an access credential.
///
/// Never fatal: the caller treats identity as unknown and keeps the credential.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The credential has no claims segment.
    #[error("credential has {0} segment(s), expected at least 2")]
    MissingSegments(usize),

    /// The claims segment is not valid base64url.
    #[error("claims segment is not valid base64url: {0}")]
    Encoding(String),

    /// The claims segment does not hold a claims record.
    #[error("claims segment is not a valid claims record: {0}")]
    Structure(String),
}

/// Errors raised by a credential storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The OS keychain refused or failed the operation.
    #[error("keyring error: {0}")]
    Keyring(String),

    /// Reading or writing the credentials file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The credentials file is not valid JSON.
    #[error("failed to parse credentials file: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors talking to the remote session API.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The request never produced a response (connection, TLS, timeout).
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether the server rejected the bearer credential.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Status { status: 401, .. })
    }

    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            ApiError::Network(_) => "Unable to reach the server".to_string(),
            ApiError::Decode(_) => "Unexpected response from the server".to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Errors loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid API base URL '{0}'")]
    InvalidUrl(String),

    #[error("could not determine the Sentinel home directory")]
    NoHome,
}

/// Errors surfaced by the session lifecycle.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Login or registration was rejected; carries the server's message.
    #[error("{message}")]
    AuthFailure { message: String },

    /// Credential renewal failed and the session was ended.
    #[error("credential renewal failed: {0}")]
    RenewalFailure(String),

    /// Best-effort session revocation failed.
    #[error("session revocation failed: {0}")]
    RevocationFailure(String),

    /// An operation required an authenticated session.
    #[error("not authenticated")]
    NotAuthenticated,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for session lifecycle operations.
pub type Result<T> = std::result::Result<T, AuthError>;
