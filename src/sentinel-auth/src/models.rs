//! Request and response bodies of the Sentinel session API.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Login request body.
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Registration request body.
#[derive(Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Credentials issued by login and registration.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthResponse").finish_non_exhaustive()
    }
}

/// Refresh request body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Refresh response body.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRefreshResponse {
    pub access_token: String,
}

impl fmt::Debug for TokenRefreshResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRefreshResponse").finish_non_exhaustive()
    }
}

/// A server-side login session of the current account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    /// Whether this is the session making the request.
    #[serde(default)]
    pub is_current: bool,
    pub ip: Option<String>,
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
    /// UTC offset of `timezone`, in the server's units. May be fractional.
    pub offset: Option<f64>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub is_mobile: Option<bool>,
    pub platform: Option<String>,
}

/// `GET /sessions` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetSessionsResponse {
    pub sessions: Vec<Session>,
}

/// Response to session revocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSessionsResponse {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_count: Option<u64>,
}

/// `GET /facts` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactResponse {
    #[serde(rename = "Tip")]
    pub tip: Tip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tip {
    pub index: u64,
    pub tip: String,
}

/// Error body returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub status: Option<String>,
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
}
