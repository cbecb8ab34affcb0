use anyhow::Result;
use tracing_subscriber::EnvFilter;

use warden_server::{AppState, router};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let state = AppState::new();
    let _timeout_shutdown = state.manager.clone().start_timeout_monitor();
    let discovered = state.mcp.initialize()?;
    tracing::info!(servers = discovered, "tool-server discovery complete");
    state.mcp.clone().start_health_monitoring().await;

    let addr = std::env::var("WARDEN_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "warden control plane listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
