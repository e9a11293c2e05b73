//! Session token cache with expiry-driven refresh.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use url::Url;

use crate::error::{AuthError, Result};
use crate::exchange::SessionExchange;
use crate::token::is_expired;

/// A usable session: a non-expired token and the endpoint it unlocks.
#[derive(Clone)]
pub struct Session {
    pub token: SecretString,
    pub server_url: Url,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("server_url", &self.server_url.as_str())
            .finish()
    }
}

#[derive(Clone)]
struct CachedSession {
    token: SecretString,
    server_url: Option<Url>,
}

/// Owns the API key and the cached session derived from it.
///
/// The cache lock is only held to copy the session in or out, never across
/// a network call. Two callers that both find the token expired will both
/// refresh; the exchange is idempotent and the last write wins.
pub struct CredentialManager {
    api_key: Option<SecretString>,
    exchange: Arc<dyn SessionExchange>,
    cached: RwLock<Option<CachedSession>>,
}

impl CredentialManager {
    #[must_use]
    pub fn new(api_key: Option<SecretString>, exchange: Arc<dyn SessionExchange>) -> Self {
        Self {
            api_key,
            exchange,
            cached: RwLock::new(None),
        }
    }

    /// Seed the cache with a token obtained out-of-band (e.g. `APP_JWT`).
    ///
    /// Without a `server_url` the first call still refreshes, to learn where
    /// the upstream lives.
    #[must_use]
    pub fn with_cached_token(self, token: SecretString, server_url: Option<Url>) -> Self {
        Self {
            cached: RwLock::new(Some(CachedSession { token, server_url })),
            ..self
        }
    }

    /// The configured API key.
    ///
    /// # Errors
    /// Returns [`AuthError::MissingCredential`] if none was configured.
    pub fn api_key(&self) -> Result<&SecretString> {
        self.api_key.as_ref().ok_or(AuthError::MissingCredential)
    }

    /// Return a valid session, refreshing when the cached one is absent,
    /// expired, or has no known upstream.
    ///
    /// # Errors
    /// Returns an [`AuthError`] if a refresh is needed and fails.
    pub async fn session(&self) -> Result<Session> {
        let cached = self.cached.read().await.clone();

        if let Some(CachedSession {
            token,
            server_url: Some(server_url),
        }) = cached
            && !is_expired(token.expose_secret())
        {
            return Ok(Session { token, server_url });
        }

        self.refresh().await
    }

    /// Return a non-expired session token, refreshing if necessary.
    ///
    /// # Errors
    /// Returns an [`AuthError`] if no valid token can be obtained.
    pub async fn get_session_token(&self) -> Result<SecretString> {
        Ok(self.session().await?.token)
    }

    /// Exchange the API key for a new session and replace the cache.
    ///
    /// # Errors
    /// Returns [`AuthError::MissingCredential`] without an API key, or the
    /// exchange's error.
    pub async fn refresh(&self) -> Result<Session> {
        let api_key = self.api_key()?;

        log::debug!("Refreshing app session token");
        let grant = self.exchange.exchange(api_key).await?;

        if grant.token.expose_secret().is_empty() {
            return Err(AuthError::MissingToken);
        }

        *self.cached.write().await = Some(CachedSession {
            token: grant.token.clone(),
            server_url: Some(grant.server_url.clone()),
        });
        log::info!("Obtained app session for {}", grant.server_url);

        Ok(Session {
            token: grant.token,
            server_url: grant.server_url,
        })
    }

    /// The cached token, whether or not it is still valid.
    pub async fn cached_token(&self) -> Option<SecretString> {
        self.cached.read().await.as_ref().map(|c| c.token.clone())
    }
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}
