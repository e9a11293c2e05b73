//! Forwarding one `ask_dataloop` call to the hosted app.

use std::sync::Arc;

use async_trait::async_trait;
use dataloop_auth::CredentialManager;
use rmcp::model::CallToolResult;
use secrecy::SecretString;
use serde_json::json;
use tracing::{debug, warn};
use url::Url;

use crate::error::{RelayError, Result};

/// Name of the tool on both sides of the relay.
pub const TOOL_NAME: &str = "ask_dataloop";

/// Everything the upstream call needs, resolved before any connection is made.
pub struct UpstreamRequest {
    pub url: Url,
    pub session_token: SecretString,
    /// Forwarded as `x-dl-info` so the app can identify the caller.
    pub api_key: Option<SecretString>,
    pub question: String,
}

impl std::fmt::Debug for UpstreamRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamRequest")
            .field("url", &self.url.as_str())
            .field("session_token", &"[REDACTED]")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("question", &self.question)
            .finish()
    }
}

/// Invokes `ask_dataloop` on the upstream MCP server.
#[async_trait]
pub trait UpstreamCaller: Send + Sync {
    async fn ask(&self, request: &UpstreamRequest) -> Result<CallToolResult>;
}

/// Stateless bridge between the local tool and the upstream one.
///
/// Each call obtains a session, forwards the question, and hands back the
/// upstream result untouched. Failures never escape as protocol errors;
/// they come back as a tool result carrying `{"error": "..."}`.
pub struct Relay {
    credentials: Arc<CredentialManager>,
    upstream: Arc<dyn UpstreamCaller>,
}

impl Relay {
    #[must_use]
    pub fn new(credentials: Arc<CredentialManager>, upstream: Arc<dyn UpstreamCaller>) -> Self {
        Self {
            credentials,
            upstream,
        }
    }

    #[must_use]
    pub const fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    /// Ask the upstream app a question.
    pub async fn ask(&self, question: &str) -> CallToolResult {
        match self.try_ask(question).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "ask_dataloop failed");
                error_result(&e)
            }
        }
    }

    /// Like [`Relay::ask`] but surfaces the failure.
    ///
    /// # Errors
    /// Returns a [`RelayError`] if the session cannot be obtained or the
    /// upstream call fails.
    pub async fn try_ask(&self, question: &str) -> Result<CallToolResult> {
        let session = self.credentials.session().await?;

        let request = UpstreamRequest {
            url: session.server_url,
            session_token: session.token,
            api_key: self.credentials.api_key().ok().cloned(),
            question: question.to_string(),
        };
        debug!(url = %request.url, "Forwarding question upstream");

        self.upstream.ask(&request).await
    }
}

/// The tool result returned in place of a failed call.
#[must_use]
pub fn error_result(err: &RelayError) -> CallToolResult {
    CallToolResult::structured_error(json!({
        "error": format!("Failed to process request: {err}"),
    }))
}
