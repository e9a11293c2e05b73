//! Locating the routing endpoint of the hosted MCP app.
//!
//! The app is installed from a dpk (Dataloop package). Each installation
//! exposes named routes; the `mcp` route is the URL that, when requested
//! with an API key, redirects to the app and sets the `JWT-APP` cookie.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use url::Url;

use crate::error::{AuthError, Result};

/// Default Dataloop gateway API root.
pub const DEFAULT_GATEWAY_URL: &str = "https://gate.dataloop.ai/api/v1";

/// Default name of the dpk that hosts the MCP app.
pub const DEFAULT_DPK_NAME: &str = "dataloop-mcp";

const MCP_ROUTE: &str = "mcp";

/// Where the routing endpoint comes from.
#[derive(Debug, Clone)]
pub enum RouteSource {
    /// A fixed URL, known per deployment.
    Static(Url),
    /// Looked up from the installed app's routes.
    AppRegistry { gateway: Url, dpk_name: String },
}

#[derive(Debug, Deserialize)]
struct AppPage {
    #[serde(default)]
    items: Vec<App>,
}

#[derive(Debug, Deserialize)]
struct App {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    routes: serde_json::Map<String, serde_json::Value>,
}

/// Resolves the routing endpoint once and remembers it.
#[derive(Debug)]
pub struct RouteResolver {
    source: RouteSource,
    resolved: OnceCell<Url>,
}

impl RouteResolver {
    #[must_use]
    pub const fn new(source: RouteSource) -> Self {
        Self {
            source,
            resolved: OnceCell::const_new(),
        }
    }

    #[must_use]
    pub const fn source(&self) -> &RouteSource {
        &self.source
    }

    /// Return the routing endpoint, querying the app registry on first use.
    ///
    /// # Errors
    /// Returns [`AuthError::Discovery`] if the app or its `mcp` route cannot be found.
    pub async fn resolve(&self, client: &Client, api_key: &SecretString) -> Result<Url> {
        self.resolved
            .get_or_try_init(|| async {
                match &self.source {
                    RouteSource::Static(url) => Ok(url.clone()),
                    RouteSource::AppRegistry { gateway, dpk_name } => {
                        query_app_route(client, gateway, dpk_name, api_key).await
                    }
                }
            })
            .await
            .cloned()
    }
}

async fn query_app_route(
    client: &Client,
    gateway: &Url,
    dpk_name: &str,
    api_key: &SecretString,
) -> Result<Url> {
    let endpoint = format!("{}/apps/query", gateway.as_str().trim_end_matches('/'));
    let body = json!({
        "resource": "apps",
        "filter": { "$and": [ { "dpkName": dpk_name } ] },
        "page": 0,
        "pageSize": 1000,
    });

    log::debug!("Querying installed apps for dpk '{dpk_name}'");

    let response = client
        .post(&endpoint)
        .bearer_auth(api_key.expose_secret())
        .json(&body)
        .send()
        .await
        .map_err(|e| AuthError::Discovery(format!("app query failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::Discovery(format!(
            "app query returned HTTP {status}"
        )));
    }

    let page: AppPage = response
        .json()
        .await
        .map_err(|e| AuthError::Discovery(format!("unreadable app query response: {e}")))?;

    let app = page
        .items
        .into_iter()
        .next()
        .ok_or_else(|| AuthError::Discovery(format!("no app installed from dpk '{dpk_name}'")))?;

    log::info!("App: {}", app.name.as_deref().unwrap_or(dpk_name));

    let route = app
        .routes
        .get(MCP_ROUTE)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| AuthError::Discovery(format!("app has no '{MCP_ROUTE}' route")))?;

    Url::parse(route).map_err(|e| AuthError::Discovery(format!("invalid route URL '{route}': {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn key() -> SecretString {
        SecretString::from("abc123".to_string())
    }

    fn registry(server: &MockServer) -> RouteResolver {
        RouteResolver::new(RouteSource::AppRegistry {
            gateway: Url::parse(&format!("{}/api/v1", server.uri())).unwrap(),
            dpk_name: DEFAULT_DPK_NAME.to_string(),
        })
    }

    #[tokio::test]
    async fn test_static_route_needs_no_network() {
        let url = Url::parse("https://gate.example.com/apps/x/panels/mcp/").unwrap();
        let resolver = RouteResolver::new(RouteSource::Static(url.clone()));

        assert_eq!(resolver.resolve(&Client::new(), &key()).await.unwrap(), url);
    }

    #[tokio::test]
    async fn test_registry_route_is_resolved_once() {
        let server = MockServer::start().await;
        let route = format!("{}/apps/dataloop-mcp-1/panels/mcp/", server.uri());

        Mock::given(method("POST"))
            .and(path("/api/v1/apps/query"))
            .and(header("authorization", "Bearer abc123"))
            .and(body_partial_json(serde_json::json!({
                "filter": { "$and": [ { "dpkName": "dataloop-mcp" } ] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [ { "name": "dataloop-mcp-1", "routes": { "mcp": route } } ],
                "totalItemsCount": 1,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = registry(&server);
        let client = Client::new();

        let first = resolver.resolve(&client, &key()).await.unwrap();
        let second = resolver.resolve(&client, &key()).await.unwrap();
        assert_eq!(first.as_str(), route);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_registry_without_apps_fails() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/apps/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": []
            })))
            .mount(&server)
            .await;

        let err = registry(&server)
            .resolve(&Client::new(), &key())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Discovery(msg) if msg.contains("no app installed")));
    }

    #[tokio::test]
    async fn test_registry_app_without_mcp_route_fails() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/apps/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [ { "name": "dataloop-mcp-1", "routes": { "ui": "https://x" } } ]
            })))
            .mount(&server)
            .await;

        let err = registry(&server)
            .resolve(&Client::new(), &key())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Discovery(msg) if msg.contains("'mcp' route")));
    }

    #[tokio::test]
    async fn test_registry_http_error_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/v1/apps/query"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = registry(&server)
            .resolve(&Client::new(), &key())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Discovery(msg) if msg.contains("401")));
    }
}
