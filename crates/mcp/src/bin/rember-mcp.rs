// Rember MCP server binary: serves the create-flashcards tool over stdio

use anyhow::{Context, Result};
use clap::Parser;
use rember_mcp::config::{resolve_api_key, McpConfig, API_KEY_ENV};
use rember_mcp::runtime::{self, SHUTDOWN_GRACE};
use rember_mcp::tools::{CreateFlashcards, ToolRegistry};
use rember_mcp::McpServer;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "rember-mcp")]
#[command(about = "MCP server to create flashcards in Rember", long_about = None)]
struct Args {
    /// Rember API key (rember_ followed by 32 hex characters)
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Path to configuration file
    #[arg(short, long, default_value = "rember-mcp.toml")]
    config: PathBuf,
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Received shutdown signal");
    shutdown.cancel();
}

async fn run(args: Args) -> Result<()> {
    let api_key = resolve_api_key(args.api_key).context("Invalid configuration")?;
    let config = McpConfig::load(&args.config)?;

    let client = config.client(&api_key)?;
    tracing::info!(base_url = %client.config().base_url, "Using Rember API");

    let mut registry = ToolRegistry::new();
    registry
        .register(CreateFlashcards::new(Arc::new(client)))
        .context("Failed to register tools")?;
    tracing::info!("Registered {} tools", registry.len());

    let server = McpServer::new(registry)
        .with_policy(config.execution_policy())
        .with_server_info(config.server_info());

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    server.serve_stdio(shutdown).await?;
    tracing::info!("Rember MCP server stopped");
    Ok(())
}

fn main() -> ExitCode {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rember_mcp=info,rember_sdk=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let args = Args::parse();
    tracing::info!("Rember MCP server starting...");

    match runtime::block_on(run(args), SHUTDOWN_GRACE) {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to start the async runtime");
            ExitCode::FAILURE
        }
    }
}
