//! # dataloop-mcp
//!
//! A stdio MCP server with a single tool, `ask_dataloop`, that relays each
//! question to the Dataloop-hosted MCP app.
//!
//! ```text
//! MCP host ──stdio──▶ DataloopServer ─▶ Relay ─▶ McpUpstream ──HTTP──▶ Dataloop app
//!                                         │
//!                                         └─▶ CredentialManager ─▶ gateway (JWT-APP)
//! ```
//!
//! - [`config`]: flag and environment settings
//! - [`relay`]: the per-call bridge and the [`relay::UpstreamCaller`] seam
//! - [`upstream`]: the streamable-HTTP MCP client
//! - [`server`]: the `rmcp` tool router and server handler

pub mod config;
mod error;
pub mod relay;
pub mod server;
pub mod upstream;

pub use config::{RelayConfig, Settings};
pub use error::{RelayError, Result};
pub use relay::{Relay, UpstreamCaller, UpstreamRequest};
pub use server::DataloopServer;
pub use upstream::McpUpstream;
