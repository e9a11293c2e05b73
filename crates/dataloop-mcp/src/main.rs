//! Dataloop MCP relay
//!
//! Serves the `ask_dataloop` tool over stdio and forwards every call to the
//! Dataloop-hosted MCP app, exchanging the API key for an app session token
//! as needed.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use secrecy::ExposeSecret;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook_tokio::Signals;
use tracing::{error, info, warn};

use dataloop_auth::{CredentialManager, HttpSessionExchange, token};
use dataloop_mcp::{DataloopServer, McpUpstream, Relay, RelayConfig, Settings};

/// Initializes structured logging with tracing.
///
/// Logs always go to stderr; stdout carries the MCP protocol. Format is
/// `json` or `pretty`, level is controlled via `RUST_LOG`.
fn init_tracing(format: &str) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dataloop_mcp=info,dataloop_auth=info"));

    match format.to_lowercase().as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(true)
                .init();
        }
    }
}

/// Logs who the API key belongs to, or warns that there is none.
fn log_identity(config: &RelayConfig) {
    let Some(api_key) = &config.api_key else {
        warn!("DATALOOP_API_KEY is not set; ask_dataloop will fail until it is provided");
        return;
    };

    match token::user_info(api_key.expose_secret()) {
        Ok(claims) => info!(
            user = claims.identity().unwrap_or("unknown"),
            "Using Dataloop API key"
        ),
        Err(e) => warn!(error = %e, "API key is not a decodable JWT"),
    }
}

fn build_credentials(config: &RelayConfig) -> anyhow::Result<CredentialManager> {
    let mut exchange =
        HttpSessionExchange::new(config.route.clone())?.with_timeout(config.read_timeout);
    if let Some(url) = &config.server_url {
        exchange = exchange.with_server_url(url.clone());
    }

    let mut credentials = CredentialManager::new(config.api_key.clone(), Arc::new(exchange));
    if let Some(app_jwt) = &config.app_jwt {
        info!("Starting from the session token in APP_JWT");
        credentials = credentials.with_cached_token(app_jwt.clone(), config.server_url.clone());
    }

    Ok(credentials)
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let config = settings.validate().context("invalid settings")?;
    info!("Successfully configured Dataloop MCP server");

    log_identity(&config);

    let credentials = Arc::new(
        build_credentials(&config).context("failed to set up the credential exchange")?,
    );

    // Resolve the app route and first session before serving.
    if credentials.api_key().is_ok()
        && let Err(e) = credentials.session().await
    {
        warn!(error = %e, "Initial app session failed; retrying on first call");
    }

    let relay = Arc::new(Relay::new(
        Arc::clone(&credentials),
        Arc::new(McpUpstream::new(config.read_timeout)),
    ));

    info!("Starting Dataloop MCP server in stdio mode");
    let service = DataloopServer::new(relay)
        .serve(stdio())
        .await
        .context("failed to start MCP server")?;

    let cancel = service.cancellation_token();
    let mut signals = Signals::new([SIGTERM, SIGINT])?;
    let signals_handle = signals.handle();
    tokio::spawn(async move {
        use futures::stream::StreamExt;
        if let Some(signal) = signals.next().await {
            match signal {
                SIGTERM => info!("Received SIGTERM, shutting down"),
                SIGINT => info!("Received SIGINT, shutting down"),
                _ => {}
            }
            cancel.cancel();
        }
    });

    let reason = service.waiting().await.context("MCP server task failed")?;
    signals_handle.close();
    info!(?reason, "Dataloop MCP server stopped");

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::try_parse() {
        Ok(settings) => settings,
        Err(e) => {
            // Usage and parse errors go to stdout/stderr; if that write fails there is nowhere left to report it.
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing(&settings.log_format);

    match run(settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Unexpected error during startup: {e:#}");
            ExitCode::FAILURE
        }
    }
}
