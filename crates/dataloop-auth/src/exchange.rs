//! Exchanging an API key for a `JWT-APP` session token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::redirect::Policy;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::cookie::{CapturingJar, SESSION_COOKIE};
use crate::discovery::{RouteResolver, RouteSource};
use crate::error::{AuthError, Result};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_REDIRECTS: usize = 10;

/// The outcome of one successful exchange.
#[derive(Clone)]
pub struct SessionGrant {
    pub token: SecretString,
    /// Address of the upstream MCP endpoint the token is valid for.
    pub server_url: Url,
}

impl std::fmt::Debug for SessionGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGrant")
            .field("token", &"[REDACTED]")
            .field("server_url", &self.server_url.as_str())
            .finish()
    }
}

/// Turns a long-lived API key into a short-lived session grant.
#[async_trait]
pub trait SessionExchange: Send + Sync {
    async fn exchange(&self, api_key: &SecretString) -> Result<SessionGrant>;
}

/// Exchange against the Dataloop gateway over HTTPS.
///
/// The routing endpoint answers a bearer-authenticated GET with a redirect
/// chain that ends at the app and sets the session cookie along the way.
#[derive(Debug)]
pub struct HttpSessionExchange {
    routes: RouteResolver,
    server_url: Option<Url>,
    discovery_client: Client,
    timeout: Duration,
}

impl HttpSessionExchange {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(source: RouteSource) -> Result<Self> {
        let discovery_client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_TIMEOUT)
            .build()?;

        Ok(Self {
            routes: RouteResolver::new(source),
            server_url: None,
            discovery_client,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Pin the upstream URL instead of taking it from the end of the redirect chain.
    #[must_use]
    pub fn with_server_url(mut self, server_url: Url) -> Self {
        self.server_url = Some(server_url);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Each exchange gets a fresh jar so a stale cookie can never be mistaken for a new one.
    fn session_client(&self, jar: Arc<CapturingJar>) -> Result<Client> {
        Ok(Client::builder()
            .cookie_provider(jar)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(self.timeout)
            .build()?)
    }
}

#[async_trait]
impl SessionExchange for HttpSessionExchange {
    async fn exchange(&self, api_key: &SecretString) -> Result<SessionGrant> {
        let route = self.routes.resolve(&self.discovery_client, api_key).await?;
        let jar = Arc::new(CapturingJar::new(SESSION_COOKIE));
        let client = self.session_client(Arc::clone(&jar))?;

        let response = client
            .get(route.clone())
            .bearer_auth(api_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        let final_url = response.url().clone();
        log::info!("App route URL: {final_url}");

        // The chain ends at the MCP endpoint itself, which rejects a plain GET.
        let Some(token) = jar.captured() else {
            if status.is_success() {
                return Err(AuthError::MissingToken);
            }
            return Err(AuthError::Refresh(format!(
                "routing endpoint {route} returned HTTP {status} without a session cookie"
            )));
        };

        Ok(SessionGrant {
            token: SecretString::from(token),
            server_url: self.server_url.clone().unwrap_or(final_url),
        })
    }
}
