//! Unverified JWT payload inspection.
//!
//! Session tokens are signed by the Dataloop gateway and verified by the
//! upstream app. The relay only reads the payload to decide when to refresh,
//! so no signature check happens here.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{AuthError, Result};

/// Claims carried by Dataloop API keys and `JWT-APP` session tokens.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Claims {
    /// Expiry as seconds since the epoch. May be fractional.
    #[serde(default)]
    pub exp: Option<f64>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Everything else in the payload.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Best human-readable identity for log lines.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.email.as_deref().or(self.sub.as_deref())
    }
}

/// Decode a JWT payload without verifying its signature.
///
/// # Errors
/// Returns [`AuthError::InvalidToken`] if the token is not three dot-separated
/// segments or the payload is not base64url-encoded JSON.
pub fn decode_claims(token: &str) -> Result<Claims> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(AuthError::InvalidToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidToken(format!("payload is not base64url: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::InvalidToken(format!("payload is not a JSON object: {e}")))
}

/// Decode the claims of an API key for diagnostics.
///
/// # Errors
/// Returns [`AuthError::InvalidToken`] if the key is not a decodable JWT.
pub fn user_info(api_key: &str) -> Result<Claims> {
    decode_claims(api_key)
}

/// Whether `token` is expired right now.
#[must_use]
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}

/// Whether `token` is expired at `now`.
///
/// Tokens that cannot be decoded or carry no `exp` claim count as expired.
#[must_use]
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match decode_claims(token) {
        Ok(Claims { exp: Some(exp), .. }) => exp < epoch_seconds(now),
        Ok(_) => {
            log::error!("Error decoding JWT: missing exp claim");
            true
        }
        Err(e) => {
            log::error!("Error decoding JWT: {e}");
            true
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn epoch_seconds(now: DateTime<Utc>) -> f64 {
    now.timestamp_millis() as f64 / 1000.0
}
