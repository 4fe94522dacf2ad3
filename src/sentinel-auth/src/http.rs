//! Shared HTTP plumbing: client construction and response decoding.

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::constants::USER_AGENT;
use crate::error::ApiError;
use crate::models::ApiErrorBody;

/// Build an HTTP client with the Sentinel user agent and `timeout`.
pub(crate) fn create_client(timeout: Duration) -> Result<Client, ApiError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .tcp_nodelay(true)
        .build()
        .map_err(|e| ApiError::Network(format!("failed to build HTTP client: {e}")))
}

/// Join an endpoint path onto a base URL.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Decode a success body as `T`, or turn a failure status into [`ApiError::Status`].
pub(crate) async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

/// Error for a non-success response, preferring the server's `message`.
pub(crate) fn status_error(status: reqwest::StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.message)
        .ok()
        .filter(|m| !m.trim().is_empty())
        .or_else(|| {
            let trimmed = body.trim();
            (!trimmed.is_empty() && trimmed.len() <= 512).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        });

    ApiError::Status {
        status: status.as_u16(),
        message,
    }
}
