//! HTTP transport that authorizes requests and recovers from expired credentials.

use parking_lot::Mutex;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::api::HttpAuthApi;
use crate::constants::RENEWAL_WAIT;
use crate::coordinator::{RenewOutcome, RenewalCoordinator};
use crate::error::ApiError;
use crate::http::{endpoint, read_json, status_error};
use crate::models::{DeleteSessionsResponse, FactResponse, GetSessionsResponse, Session};

/// Client for bearer-authorized endpoints.
///
/// Every request carries the current access credential. A 401 triggers one
/// renewal through the [`RenewalCoordinator`] and one retry with the renewed
/// credential; a second 401, or a renewal that ends the session, is returned
/// to the caller.
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    client: Client,
    base_url: String,
    coordinator: Arc<RenewalCoordinator>,
    renewal_wait: Duration,
}

impl AuthorizedClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        coordinator: Arc<RenewalCoordinator>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            coordinator,
            renewal_wait: RENEWAL_WAIT,
        }
    }

    /// Share the HTTP client and base URL of `api`.
    pub fn from_api(api: &HttpAuthApi, coordinator: Arc<RenewalCoordinator>) -> Self {
        Self::new(api.client().clone(), api.base_url(), coordinator)
    }

    /// How long a request waits on a renewal started by someone else.
    pub fn with_renewal_wait(mut self, wait: Duration) -> Self {
        self.renewal_wait = wait;
        self
    }

    pub fn coordinator(&self) -> &Arc<RenewalCoordinator> {
        &self.coordinator
    }

    /// `GET /sessions`
    pub async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
        let response: GetSessionsResponse = self.get("/sessions").await?;
        Ok(response.sessions)
    }

    /// `DELETE /sessions/{id}`
    pub async fn revoke_session(&self, session_id: &str) -> Result<DeleteSessionsResponse, ApiError> {
        self.delete(&format!("/sessions/{session_id}")).await
    }

    /// `DELETE /sessions/others`
    pub async fn revoke_other_sessions(&self) -> Result<DeleteSessionsResponse, ApiError> {
        self.delete("/sessions/others").await
    }

    /// `GET /facts`
    pub async fn get_fact(&self) -> Result<FactResponse, ApiError> {
        self.get("/facts").await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        read_json(self.send(Method::GET, path).await?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        read_json(self.send(Method::DELETE, path).await?).await
    }

    /// Send an authorized request, renewing and retrying once on 401.
    pub async fn send(&self, method: Method, path: &str) -> Result<Response, ApiError> {
        let url = endpoint(&self.base_url, path);
        let access_token = self.coordinator.current_access_token();

        let response = self
            .dispatch(method.clone(), &url, access_token.as_deref())
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(url = %url, "Request unauthorized, renewing credential");
        let rejected = response.text().await.unwrap_or_default();
        match self.renewed_credential(access_token.as_deref()).await {
            Some(renewed) => {
                debug!(url = %url, "Retrying with renewed credential");
                self.dispatch(method, &url, Some(&renewed)).await
            }
            None => Err(status_error(StatusCode::UNAUTHORIZED, &rejected)),
        }
    }

    async fn dispatch(
        &self,
        method: Method,
        url: &str,
        access_token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let mut request = self.client.request(method, url);
        if let Some(token) = access_token {
            request = request.bearer_auth(token);
        }
        Ok(request.send().await?)
    }

    /// Obtain a credential newer than `stale`, or `None` if the session ended.
    async fn renewed_credential(&self, stale: Option<&str>) -> Option<String> {
        let (sender, receiver) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(sender)));
        let _subscription = self.coordinator.on_renewed(move |token| {
            if let Some(sender) = slot.lock().take() {
                let _ = sender.send(token.to_string());
            }
        });

        match self.coordinator.renew().await {
            RenewOutcome::Renewed(token) => Some(token),
            RenewOutcome::Coalesced => self.await_renewal(stale, receiver).await,
            outcome => {
                debug!(?outcome, "Renewal did not produce a credential");
                None
            }
        }
    }

    async fn await_renewal(
        &self,
        stale: Option<&str>,
        receiver: oneshot::Receiver<String>,
    ) -> Option<String> {
        let mut state = self.coordinator.subscribe_state();
        let settled = async {
            tokio::select! {
                token = receiver => token.ok(),
                // Also covers a renewal that finished before we subscribed.
                changed = state.wait_for(|s| {
                    !s.is_authenticated()
                        || s.credentials.as_ref().map(|c| c.access_token()) != stale
                }) => changed.ok().and_then(|s| {
                    if s.is_authenticated() {
                        s.credentials.as_ref().map(|c| c.access_token().to_string())
                    } else {
                        None
                    }
                }),
            }
        };

        match tokio::time::timeout(self.renewal_wait, settled).await {
            Ok(token) => token,
            Err(_) => {
                warn!(
                    wait_secs = self.renewal_wait.as_secs(),
                    "Timed out waiting for credential renewal"
                );
                None
            }
        }
    }
}
