//! # dataloop-auth
//!
//! Credential handling for the Dataloop MCP relay.
//!
//! A long-lived Dataloop API key cannot call the hosted MCP app directly. The
//! app sits behind a routing endpoint that, given the key as a bearer token,
//! redirects to the app and sets a short-lived `JWT-APP` session cookie. This
//! crate performs that exchange and caches the result.
//!
//! ## Core Components
//!
//! - [`CredentialManager`]: owns the API key and the cached [`Session`]
//! - [`SessionExchange`]: seam for obtaining a new [`SessionGrant`]
//! - [`HttpSessionExchange`]: the gateway-backed exchange
//! - [`RouteResolver`]: finds the routing endpoint, statically or from the app registry
//! - [`token`]: unverified JWT payload inspection and expiry checks
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dataloop_auth::{CredentialManager, HttpSessionExchange, RouteSource};
//! use secrecy::SecretString;
//! use url::Url;
//!
//! # async fn example() -> Result<(), dataloop_auth::AuthError> {
//! let route = Url::parse("https://gate.dataloop.ai/api/v1/apps/dataloop-mcp/panels/mcp/")
//!     .map_err(|e| dataloop_auth::AuthError::Discovery(e.to_string()))?;
//! let exchange = HttpSessionExchange::new(RouteSource::Static(route))?;
//! let credentials = CredentialManager::new(
//!     Some(SecretString::from("my-api-key".to_string())),
//!     Arc::new(exchange),
//! );
//!
//! let session = credentials.session().await?;
//! println!("upstream: {}", session.server_url);
//! # Ok(())
//! # }
//! ```

pub mod cookie;
pub mod discovery;
mod error;
mod exchange;
mod manager;
pub mod token;

pub use cookie::SESSION_COOKIE;
pub use discovery::{DEFAULT_DPK_NAME, DEFAULT_GATEWAY_URL, RouteResolver, RouteSource};
pub use error::{AuthError, Result};
pub use exchange::{HttpSessionExchange, SessionExchange, SessionGrant};
pub use manager::{CredentialManager, Session};
