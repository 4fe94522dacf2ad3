//! Client for the Sentinel authentication endpoints.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::DEFAULT_REQUEST_TIMEOUT;
use crate::error::ApiError;
use crate::http::{create_client, endpoint, read_json};
use crate::models::{
    AuthResponse, DeleteSessionsResponse, LoginRequest, RegisterRequest, TokenRefreshRequest,
    TokenRefreshResponse,
};

/// The remote operations the session lifecycle depends on.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// `POST /auth/login`
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError>;

    /// `POST /auth/register`
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError>;

    /// `POST /auth/token`
    async fn refresh(&self, refresh_token: &str) -> Result<TokenRefreshResponse, ApiError>;

    /// `DELETE /sessions/{id}` authorized with `access_token`.
    async fn revoke_session(
        &self,
        access_token: &str,
        session_id: &str,
    ) -> Result<DeleteSessionsResponse, ApiError>;
}

/// [`AuthApi`] over HTTP.
#[derive(Clone, Debug)]
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    /// Create a client for the API rooted at `base_url` (e.g. `https://host/api`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self::with_client(create_client(timeout)?, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The underlying HTTP client, shared with [`crate::AuthorizedClient`].
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn post_credentials<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<AuthResponse, ApiError> {
        let url = endpoint(&self.base_url, path);
        debug!(url = %url, "Requesting credentials");
        let response = self.client.post(&url).json(body).send().await?;
        read_json(response).await.inspect_err(|e| {
            warn!(url = %url, error = %e, "Credential request rejected");
        })
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        self.post_credentials("/auth/login", request).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        self.post_credentials("/auth/register", request).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenRefreshResponse, ApiError> {
        let url = endpoint(&self.base_url, "/auth/token");
        let response = self
            .client
            .post(&url)
            .json(&TokenRefreshRequest { refresh_token })
            .send()
            .await?;
        read_json(response).await
    }

    async fn revoke_session(
        &self,
        access_token: &str,
        session_id: &str,
    ) -> Result<DeleteSessionsResponse, ApiError> {
        let url = endpoint(&self.base_url, &format!("/sessions/{session_id}"));
        let response = self
            .client
            .delete(&url)
            .bearer_auth(access_token)
            .send()
            .await?;
        read_json(response).await
    }
}
