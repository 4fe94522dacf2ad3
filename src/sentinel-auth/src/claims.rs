//! Access credential claims decoding.
//!
//! Access credentials are three dot-delimited segments whose middle segment is
//! a base64url JSON record. Claims are read without verifying the signature;
//! they are only used for display and for deciding when to renew.

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::constants::SESSION_ID_CLAIMS;
use crate::error::DecodeError;

/// base64url engine that accepts the claims segment with or without padding.
const CLAIMS_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Identity and expiry read from an access credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedClaims {
    /// Subject (user) identifier.
    pub subject_id: String,
    /// Account email. Empty when the credential carries none.
    pub email: String,
    /// Server-side session identifier, absent on older credentials.
    pub session_id: Option<String>,
    /// Expiry in seconds since the Unix epoch.
    pub expires_at: i64,
}

impl DecodedClaims {
    /// Seconds until expiry relative to `now`. Negative once expired.
    pub fn time_until_expiry(&self, now: i64) -> i64 {
        self.expires_at - now
    }

    /// Whether the credential expires in less than `buffer` from `now`.
    pub fn expires_within(&self, now: i64, buffer: Duration) -> bool {
        let buffer = i64::try_from(buffer.as_secs()).unwrap_or(i64::MAX);
        self.time_until_expiry(now) < buffer
    }
}

#[derive(Deserialize)]
struct RawClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    exp: Value,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Decode the claims embedded in an access credential.
pub fn decode(access_token: &str) -> Result<DecodedClaims, DecodeError> {
    let segments: Vec<&str> = access_token.split('.').collect();
    if segments.len() < 2 {
        return Err(DecodeError::MissingSegments(segments.len()));
    }

    let payload = CLAIMS_ENGINE
        .decode(segments[1])
        .map_err(|e| DecodeError::Encoding(e.to_string()))?;

    let raw: RawClaims =
        serde_json::from_slice(&payload).map_err(|e| DecodeError::Structure(e.to_string()))?;

    let expires_at = match &raw.exp {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| DecodeError::Structure("exp is out of range".to_string()))?,
        _ => return Err(DecodeError::Structure("exp is not a number".to_string())),
    };

    let session_id = SESSION_ID_CLAIMS
        .iter()
        .find_map(|name| raw.extra.get(*name).and_then(Value::as_str))
        .map(str::to_string);

    Ok(DecodedClaims {
        subject_id: raw.sub,
        email: raw.email.unwrap_or_default(),
        session_id,
        expires_at,
    })
}

/// Decode claims, logging and discarding a failure.
pub(crate) fn decode_identity(access_token: &str) -> Option<DecodedClaims> {
    match decode(access_token) {
        Ok(claims) => Some(claims),
        Err(e) => {
            tracing::debug!(error = %e, "Access credential claims unreadable, identity unknown");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod test_tokens {
    use super::*;

    /// Build an unsigned credential carrying `claims`.
    pub fn encode(claims: &Value) -> String {
        let header = CLAIMS_ENGINE.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = CLAIMS_ENGINE.encode(claims.to_string());
        format!("{header}.{payload}.signature")
    }
}
