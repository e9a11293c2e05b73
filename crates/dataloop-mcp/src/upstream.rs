//! Streamable-HTTP MCP client for the hosted Dataloop app.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use dataloop_auth::SESSION_COOKIE;
use reqwest::Client;
use reqwest::header::{COOKIE, HeaderMap, HeaderName, HeaderValue};
use rmcp::ServiceExt;
use rmcp::model::{CallToolRequestParams, CallToolResult};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::error::{RelayError, Result};
use crate::relay::{TOOL_NAME, UpstreamCaller, UpstreamRequest};

/// Default read timeout for the upstream handshake and tool call (60 seconds).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const CALLER_INFO_HEADER: HeaderName = HeaderName::from_static("x-dl-info");

/// Opens a fresh MCP client session per call, authenticated by the session cookie.
#[derive(Debug, Clone)]
pub struct McpUpstream {
    read_timeout: Duration,
}

impl Default for McpUpstream {
    fn default() -> Self {
        Self::new(DEFAULT_READ_TIMEOUT)
    }
}

impl McpUpstream {
    #[must_use]
    pub const fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }

    /// HTTP client whose every request carries the session cookie and caller info.
    fn http_client(request: &UpstreamRequest) -> Result<Client> {
        let mut headers = HeaderMap::new();

        let mut cookie = HeaderValue::from_str(&format!(
            "{SESSION_COOKIE}={}",
            request.session_token.expose_secret()
        ))
        .map_err(|_| RelayError::Upstream("session token is not a valid header value".into()))?;
        cookie.set_sensitive(true);
        headers.insert(COOKIE, cookie);

        if let Some(api_key) = &request.api_key {
            let mut info = HeaderValue::from_str(api_key.expose_secret())
                .map_err(|_| RelayError::Upstream("API key is not a valid header value".into()))?;
            info.set_sensitive(true);
            headers.insert(CALLER_INFO_HEADER, info);
        }

        Ok(Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?)
    }

    async fn bounded<T, E: std::fmt::Display>(
        &self,
        stage: &str,
        fut: impl Future<Output = std::result::Result<T, E>>,
    ) -> Result<T> {
        tokio::time::timeout(self.read_timeout, fut)
            .await
            .map_err(|_| RelayError::Timeout(self.read_timeout))?
            .map_err(|e| RelayError::Upstream(format!("{stage} failed: {e}")))
    }
}

#[async_trait]
impl UpstreamCaller for McpUpstream {
    async fn ask(&self, request: &UpstreamRequest) -> Result<CallToolResult> {
        let client = Self::http_client(request)?;
        let transport = StreamableHttpClientTransport::with_client(
            client,
            StreamableHttpClientTransportConfig::with_uri(request.url.as_str()),
        );

        let service = self.bounded("handshake", ().serve(transport)).await?;

        if let Some(info) = service.peer_info() {
            debug!(server = %info.server_info.name, "Connected to upstream MCP server");
        }

        let mut arguments = serde_json::Map::new();
        arguments.insert(
            "question".to_string(),
            serde_json::Value::String(request.question.clone()),
        );
        let call = CallToolRequestParams {
            meta: None,
            name: TOOL_NAME.into(),
            arguments: Some(arguments),
            task: None,
        };

        let result = self
            .bounded("tool call", service.peer().call_tool(call))
            .await;

        if let Err(e) = service.cancel().await {
            debug!(error = %e, "Upstream session did not close cleanly");
        }

        let result = result?;
        info!(is_error = ?result.is_error, "Upstream answered {TOOL_NAME}");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use secrecy::SecretString;
    use serde_json::{Value, json};
    use url::Url;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    use super::*;

    fn request(url: &str, api_key: Option<&str>) -> UpstreamRequest {
        UpstreamRequest {
            url: Url::parse(url).unwrap(),
            session_token: SecretString::from("xyz".to_string()),
            api_key: api_key.map(|k| SecretString::from(k.to_string())),
            question: "What is Dataloop?".to_string(),
        }
    }

    fn answer() -> Value {
        json!({
            "content": [{ "type": "text", "text": "Dataloop is a data platform" }],
            "isError": false
        })
    }

    /// Minimal JSON-RPC app: answers `initialize` and `tools/call`, accepts notifications.
    struct DocsApp;

    impl Respond for DocsApp {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let Ok(body) = serde_json::from_slice::<Value>(&request.body) else {
                return ResponseTemplate::new(400);
            };
            let Some(id) = body.get("id").cloned() else {
                return ResponseTemplate::new(202);
            };
            let result = match body["method"].as_str() {
                Some("initialize") => json!({
                    "protocolVersion": body["params"]["protocolVersion"],
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "dataloop-docs", "version": "1.0.0" }
                }),
                Some("tools/call") => answer(),
                _ => json!({}),
            };
            ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": result
            }))
        }
    }

    #[tokio::test]
    async fn test_ask_calls_tool_and_returns_result_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(header("cookie", "JWT-APP=xyz"))
            .respond_with(DocsApp)
            .mount(&server)
            .await;

        let upstream = McpUpstream::new(Duration::from_secs(5));
        let result = upstream
            .ask(&request(&format!("{}/mcp", server.uri()), Some("abc123")))
            .await
            .unwrap();

        assert_eq!(serde_json::to_value(&result).unwrap(), answer());

        let calls: Vec<Value> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
            .filter(|body| body["method"] == "tools/call")
            .collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0]["params"]["name"], TOOL_NAME);
        assert_eq!(
            calls[0]["params"]["arguments"],
            json!({ "question": "What is Dataloop?" })
        );
    }

    #[tokio::test]
    async fn test_http_client_sends_session_cookie_and_caller_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/probe"))
            .and(header("cookie", "JWT-APP=xyz"))
            .and(header("x-dl-info", "abc123"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let req = request(&format!("{}/mcp", server.uri()), Some("abc123"));
        let client = McpUpstream::http_client(&req).unwrap();
        let response = client
            .get(format!("{}/probe", server.uri()))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 204);
    }

    #[tokio::test]
    async fn test_http_client_omits_caller_info_without_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/probe"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let req = request(&format!("{}/mcp", server.uri()), None);
        McpUpstream::http_client(&req)
            .unwrap()
            .get(format!("{}/probe", server.uri()))
            .send()
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        assert!(received[0].headers.get("x-dl-info").is_none());
    }

    #[test]
    fn test_token_with_newline_is_rejected() {
        let mut req = request("https://app.example.com/mcp", None);
        req.session_token = SecretString::from("bad\ntoken".to_string());

        let err = McpUpstream::http_client(&req).unwrap_err();
        assert!(matches!(err, RelayError::Upstream(_)));
    }

    #[tokio::test]
    async fn test_rejected_handshake_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let upstream = McpUpstream::new(Duration::from_secs(5));
        let err = upstream
            .ask(&request(&format!("{}/mcp", server.uri()), Some("abc123")))
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Upstream(msg) if msg.starts_with("handshake failed")));
    }

    #[tokio::test]
    async fn test_silent_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let upstream = McpUpstream::new(Duration::from_millis(200));
        let err = upstream
            .ask(&request(&format!("{}/mcp", server.uri()), None))
            .await
            .unwrap_err();

        assert!(matches!(err, RelayError::Timeout(_)));
    }
}
