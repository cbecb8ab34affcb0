use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use warden_contracts::ContractStatistics;
use warden_mcp::{McpHealthRegistry, McpStatistics};
use warden_registry::RegistryStatistics;
use warden_server::AppState;
use warden_store::{SqliteAuditLog, SqliteContractStore};

use crate::commands::{OutputFormat, render};
use crate::config::WardenConfig;

/// One snapshot of the control plane, as rendered by `warden dashboard`.
/// Interactive keys (Q to quit, R to refresh) are the caller's concern;
/// the command itself renders a single frame.
#[derive(Debug, Serialize)]
pub struct DashboardSnapshot {
    pub contracts: ContractStatistics,
    pub agents: RegistryStatistics,
    pub tool_servers: McpStatistics,
    pub audit_chain_intact: bool,
}

pub async fn run(config: &WardenConfig, format: OutputFormat) -> Result<()> {
    let snapshot = build_snapshot(config).await?;
    println!("{}", render(&snapshot, format)?);
    Ok(())
}

pub async fn build_snapshot(config: &WardenConfig) -> Result<DashboardSnapshot> {
    let data_dir = config.resolve_data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let database_url = format!("sqlite://{}", data_dir.join("warden.db").display());
    let store = SqliteContractStore::connect(&database_url).await?;
    let audit = SqliteAuditLog::new(store.pool());

    let state = AppState::with_backends(Arc::new(store), Arc::new(audit));
    let discovered = {
        let mcp = McpHealthRegistry::new(config.mcp.clone());
        mcp.initialize()?;
        mcp
    };
    discovered.check_all_health().await;

    Ok(DashboardSnapshot {
        contracts: state.manager.get_statistics(None).await?,
        agents: state.registry.statistics(),
        tool_servers: discovered.statistics(),
        audit_chain_intact: state.audit.verify_integrity().await?,
    })
}
