//! Shared fixtures for sentinel-auth integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use parking_lot::Mutex;
use sentinel_auth::models::{
    AuthResponse, DeleteSessionsResponse, LoginRequest, RegisterRequest, TokenRefreshResponse,
};
use sentinel_auth::{ApiError, AuthApi, Destination, Navigator};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Build an unsigned access credential carrying `claims`.
pub fn token_with(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

/// Access credential for `sub` expiring at `exp`.
pub fn token(sub: &str, exp: i64) -> String {
    token_with(json!({"sub": sub, "email": format!("{sub}@example.com"), "exp": exp}))
}

/// Access credential that also names its server-side session.
pub fn session_token(sub: &str, session_id: &str, exp: i64) -> String {
    token_with(json!({
        "sub": sub,
        "email": format!("{sub}@example.com"),
        "sessionId": session_id,
        "exp": exp
    }))
}

/// Access credential valid for an hour of wall-clock time.
pub fn fresh_token(sub: &str) -> String {
    token(sub, chrono::Utc::now().timestamp() + 3600)
}

/// Scripted result of a [`MockApi`] call.
#[derive(Debug, Clone)]
pub enum Reply {
    Credentials { access: String, refresh: String },
    Access(String),
    Status(u16, String),
    Unreachable,
    Revoked,
}

impl Reply {
    fn error(&self) -> ApiError {
        match self {
            Reply::Status(status, message) => ApiError::Status {
                status: *status,
                message: message.clone(),
            },
            _ => ApiError::Network("connection refused".to_string()),
        }
    }
}

/// In-process [`AuthApi`] with call counters and an optional refresh gate.
pub struct MockApi {
    pub login_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub refresh_tokens_seen: Mutex<Vec<String>>,
    pub revocations: Mutex<Vec<(String, String)>>,
    auth_reply: Mutex<Reply>,
    refresh_reply: Mutex<Reply>,
    revoke_reply: Mutex<Reply>,
    refresh_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            login_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            refresh_tokens_seen: Mutex::new(Vec::new()),
            revocations: Mutex::new(Vec::new()),
            auth_reply: Mutex::new(Reply::Status(401, "Invalid credentials".to_string())),
            refresh_reply: Mutex::new(Reply::Status(401, "Invalid refresh token".to_string())),
            revoke_reply: Mutex::new(Reply::Revoked),
            refresh_gate: Mutex::new(None),
        })
    }

    pub fn reply_to_auth(&self, reply: Reply) {
        *self.auth_reply.lock() = reply;
    }

    pub fn reply_to_refresh(&self, reply: Reply) {
        *self.refresh_reply.lock() = reply;
    }

    pub fn reply_to_revoke(&self, reply: Reply) {
        *self.revoke_reply.lock() = reply;
    }

    /// Hold every refresh call until the returned gate is notified.
    pub fn gate_refresh(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.refresh_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn refresh_count(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn auth_result(&self) -> Result<AuthResponse, ApiError> {
        match &*self.auth_reply.lock() {
            Reply::Credentials { access, refresh } => Ok(AuthResponse {
                access_token: access.clone(),
                refresh_token: refresh.clone(),
            }),
            other => Err(other.error()),
        }
    }
}

#[async_trait]
impl AuthApi for MockApi {
    async fn login(&self, _request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.auth_result()
    }

    async fn register(&self, _request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.auth_result()
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenRefreshResponse, ApiError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_tokens_seen
            .lock()
            .push(refresh_token.to_string());

        let gate = self.refresh_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let reply = self.refresh_reply.lock().clone();
        match reply {
            Reply::Access(access) => Ok(TokenRefreshResponse {
                access_token: access,
            }),
            other => Err(other.error()),
        }
    }

    async fn revoke_session(
        &self,
        access_token: &str,
        session_id: &str,
    ) -> Result<DeleteSessionsResponse, ApiError> {
        self.revocations
            .lock()
            .push((access_token.to_string(), session_id.to_string()));
        let reply = self.revoke_reply.lock().clone();
        match reply {
            Reply::Revoked => Ok(DeleteSessionsResponse {
                message: "Session revoked".to_string(),
                deleted_count: Some(1),
            }),
            other => Err(other.error()),
        }
    }
}

/// Records navigation signals.
#[derive(Clone, Default)]
pub struct RecordingNavigator {
    pub seen: Arc<Mutex<Vec<Destination>>>,
}

impl RecordingNavigator {
    pub fn destinations(&self) -> Vec<Destination> {
        self.seen.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, destination: Destination) {
        self.seen.lock().push(destination);
    }
}
