//! Process settings.
//!
//! Every setting can be passed as a flag or through the environment, so the
//! relay can be launched by an MCP host that only controls env vars:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "dataloop": {
//!       "command": "dataloop-mcp",
//!       "env": { "DATALOOP_API_KEY": "..." }
//!     }
//!   }
//! }
//! ```
//!
//! Without `MCP_DATALOOP_ROUTE_URL` the routing endpoint is looked up from the
//! app installed from `MCP_DATALOOP_DPK_NAME`. Without `MCP_DATALOOP_SERVER_URL`
//! the upstream is wherever the routing endpoint redirects to.

use std::time::Duration;

use clap::Parser;
use dataloop_auth::{DEFAULT_DPK_NAME, DEFAULT_GATEWAY_URL, RouteSource};
use secrecy::SecretString;
use url::Url;

use crate::error::{RelayError, Result};

/// Dataloop MCP relay: serves `ask_dataloop` over stdio.
#[derive(Debug, Clone, Parser)]
#[command(name = "dataloop-mcp", version, about)]
pub struct Settings {
    /// Long-lived Dataloop API key
    #[arg(long, env = "DATALOOP_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Dataloop gateway API root used for app discovery
    #[arg(long, env = "MCP_DATALOOP_GATEWAY_URL", default_value = DEFAULT_GATEWAY_URL)]
    pub gateway_url: String,

    /// Name of the dpk the MCP app is installed from
    #[arg(long, env = "MCP_DATALOOP_DPK_NAME", default_value = DEFAULT_DPK_NAME)]
    pub dpk_name: String,

    /// Fixed routing endpoint; skips app discovery
    #[arg(long, env = "MCP_DATALOOP_ROUTE_URL")]
    pub route_url: Option<String>,

    /// Fixed upstream MCP endpoint; otherwise the end of the route's redirect chain
    #[arg(long, env = "MCP_DATALOOP_SERVER_URL")]
    pub server_url: Option<String>,

    /// Previously issued session token to start from
    #[arg(long, env = "APP_JWT", hide_env_values = true)]
    pub app_jwt: Option<String>,

    /// Upstream read timeout in seconds
    #[arg(long = "read-timeout", env = "MCP_DATALOOP_READ_TIMEOUT", default_value_t = 60)]
    pub read_timeout_secs: u64,

    /// Log output format: `pretty` or `json`
    #[arg(long, env = "MCP_DATALOOP_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

/// Settings after validation, in the types the relay works with.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub api_key: Option<SecretString>,
    pub route: RouteSource,
    pub server_url: Option<Url>,
    pub app_jwt: Option<SecretString>,
    pub read_timeout: Duration,
}

impl Settings {
    /// Validate the settings and convert them to a [`RelayConfig`].
    ///
    /// A missing API key is not an error here: the server still starts and
    /// every call reports the missing key.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if:
    /// - Any URL does not parse
    /// - The read timeout is zero
    /// - The log format is unknown
    pub fn validate(&self) -> Result<RelayConfig> {
        if self.read_timeout_secs == 0 {
            return Err(RelayError::Config(
                "read timeout must be at least 1 second".to_string(),
            ));
        }

        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err(RelayError::Config(format!(
                "unknown log format '{}' (expected 'pretty' or 'json')",
                self.log_format
            )));
        }

        let route = match &self.route_url {
            Some(url) => RouteSource::Static(parse_url("route URL", url)?),
            None => {
                if self.dpk_name.trim().is_empty() {
                    return Err(RelayError::Config("dpk name must not be empty".to_string()));
                }
                RouteSource::AppRegistry {
                    gateway: parse_url("gateway URL", &self.gateway_url)?,
                    dpk_name: self.dpk_name.clone(),
                }
            }
        };

        let server_url = self
            .server_url
            .as_deref()
            .map(|url| parse_url("server URL", url))
            .transpose()?;

        Ok(RelayConfig {
            api_key: non_empty_secret(self.api_key.as_deref()),
            route,
            server_url,
            app_jwt: non_empty_secret(self.app_jwt.as_deref()),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
        })
    }
}

fn parse_url(what: &str, raw: &str) -> Result<Url> {
    Url::parse(raw.trim()).map_err(|e| RelayError::Config(format!("invalid {what} '{raw}': {e}")))
}

fn non_empty_secret(raw: Option<&str>) -> Option<SecretString> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| SecretString::from(s.to_string()))
}
