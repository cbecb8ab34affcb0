use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use warden_bootstrap::BootstrapConfig;
use warden_contracts::ContractManagerConfig;
use warden_firebreak::FirebreakConfig;
use warden_mcp::McpConfig;
use warden_reputation::ReputationConfig;
use warden_security::SecurityConfig;

fn default_data_dir() -> String {
    "./warden-data".to_string()
}

/// Top-level configuration aggregating every component's tagged config.
/// Unknown keys are rejected at load.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WardenConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub manager: ContractManagerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub firebreak: FirebreakConfig,
    #[serde(default)]
    pub reputation: ReputationConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub mcp: McpConfig,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            manager: ContractManagerConfig::default(),
            security: SecurityConfig::default(),
            firebreak: FirebreakConfig::default(),
            reputation: ReputationConfig::default(),
            bootstrap: BootstrapConfig::default(),
            mcp: McpConfig::default(),
        }
    }
}

impl WardenConfig {
    /// Default config file location under the operations root.
    pub fn config_path(root: &Path) -> PathBuf {
        root.join("warden.toml")
    }

    /// Load config from disk. Returns defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Resolved data directory: `DATA_DIR` wins over the config value.
    pub fn resolve_data_dir(&self) -> PathBuf {
        match std::env::var("DATA_DIR") {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => PathBuf::from(&self.data_dir),
        }
    }
}
