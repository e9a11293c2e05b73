//! The stdio-facing MCP server exposing `ask_dataloop`.

use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, schemars, tool, tool_handler, tool_router};
use serde::Deserialize;
use tracing::info;

use crate::relay::Relay;

const INSTRUCTIONS: &str = "Ask questions about the Dataloop platform. Answers come from the \
    Dataloop documentation assistant, authenticated with your DATALOOP_API_KEY.";

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[schemars(crate = "rmcp::schemars")]
pub struct AskRequest {
    /// The question to ask
    pub question: String,
}

#[derive(Clone)]
pub struct DataloopServer {
    relay: Arc<Relay>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl DataloopServer {
    #[must_use]
    pub fn new(relay: Arc<Relay>) -> Self {
        Self {
            relay,
            tool_router: Self::tool_router(),
        }
    }

    /// Ask the Dataloop documentation.
    #[tool(description = "Ask the Dataloop docs")]
    pub async fn ask_dataloop(
        &self,
        Parameters(AskRequest { question }): Parameters<AskRequest>,
    ) -> Result<CallToolResult, McpError> {
        info!(question_len = question.len(), "ask_dataloop called");
        Ok(self.relay.ask(&question).await)
    }
}

#[tool_handler]
impl ServerHandler for DataloopServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(INSTRUCTIONS.to_string()),
            ..Default::default()
        }
    }
}
