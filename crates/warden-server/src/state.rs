use std::sync::Arc;

use warden_classification::ClassificationEnforcer;
use warden_contracts::{ContractManager, ContractManagerConfig};
use warden_firebreak::{FirebreakConfig, FirebreakEnforcer, OverrideManager};
use warden_mcp::{McpConfig, McpHealthRegistry};
use warden_registry::CapabilityRegistry;
use warden_reputation::{ReputationConfig, ReputationEngine};
use warden_security::{SecurityConfig, SecurityValidator};
use warden_store::{AuditLog, ContractStore, InMemoryAuditLog, InMemoryContractStore};

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ContractManager>,
    pub registry: Arc<CapabilityRegistry>,
    pub firebreak: Arc<FirebreakEnforcer>,
    pub overrides: Arc<OverrideManager>,
    pub mcp: Arc<McpHealthRegistry>,
    pub audit: Arc<dyn AuditLog>,
}

impl AppState {
    /// In-memory control plane, used by tests and the default server.
    pub fn new() -> Self {
        let store: Arc<dyn ContractStore> = Arc::new(InMemoryContractStore::new());
        let audit: Arc<dyn AuditLog> = Arc::new(InMemoryAuditLog::new());
        Self::with_backends(store, audit)
    }

    /// Assemble the control plane on explicit storage backends.
    pub fn with_backends(store: Arc<dyn ContractStore>, audit: Arc<dyn AuditLog>) -> Self {
        let registry = Arc::new(CapabilityRegistry::new());
        let firebreak = Arc::new(FirebreakEnforcer::new(FirebreakConfig::default()));
        let reputation = Arc::new(ReputationEngine::new(
            audit.clone(),
            ReputationConfig::default(),
        ));
        let manager = Arc::new(ContractManager::new(
            store,
            audit.clone(),
            registry.clone(),
            Arc::new(ClassificationEnforcer::new()),
            Arc::new(SecurityValidator::new(SecurityConfig::default())),
            reputation,
            firebreak.clone(),
            ContractManagerConfig::default(),
        ));

        Self {
            manager,
            registry,
            firebreak,
            overrides: Arc::new(OverrideManager::new()),
            mcp: Arc::new(McpHealthRegistry::new(McpConfig::default())),
            audit,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
