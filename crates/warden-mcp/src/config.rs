use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use warden_types::{Result, WardenError};

use crate::server::ServerEntry;

fn default_health_check_interval_secs() -> u64 {
    60
}

fn default_probe_timeout_secs() -> u64 {
    5
}

/// Registry configuration: where to discover server definitions and how
/// often to probe them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct McpConfig {
    /// Ordered discovery paths; the first readable, parsable file wins.
    #[serde(default)]
    pub discovery_paths: Vec<PathBuf>,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    /// Hard deadline per probe.
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            discovery_paths: Vec::new(),
            health_check_interval_secs: default_health_check_interval_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

/// Parse a discovery document into server entries. Recognized top-level
/// shapes: `{"mcpServers": {...}}`, `{"servers": {...}}`, or the mapping
/// itself. Entry names come from the mapping key unless the entry carries
/// its own `name`.
pub fn parse_discovery_document(content: &str) -> Result<Vec<ServerEntry>> {
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| WardenError::invalid(format!("malformed discovery document: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| WardenError::invalid("discovery document must be a JSON object"))?;

    let mapping = object
        .get("mcpServers")
        .or_else(|| object.get("servers"))
        .and_then(|v| v.as_object())
        .unwrap_or(object);

    let mut entries = Vec::new();
    for (key, raw) in mapping {
        let mut entry: ServerEntry = serde_json::from_value(with_name(key, raw.clone()))
            .map_err(|e| WardenError::invalid(format!("server entry '{key}': {e}")))?;
        if entry.name.is_empty() {
            entry.name = key.clone();
        }
        entries.push(entry);
    }
    Ok(entries)
}

fn with_name(key: &str, mut raw: serde_json::Value) -> serde_json::Value {
    if let Some(object) = raw.as_object_mut() {
        object
            .entry("name")
            .or_insert_with(|| serde_json::Value::String(key.to_string()));
    }
    raw
}

/// Load server entries from the first discovery path that exists and
/// parses. Later paths are ignored once one wins.
pub fn discover_servers(paths: &[PathBuf]) -> Result<Vec<ServerEntry>> {
    for path in paths {
        if !path.exists() {
            continue;
        }
        match load_path(path) {
            Ok(entries) => {
                tracing::info!(path = %path.display(), servers = entries.len(),
                    "loaded tool-server configuration");
                return Ok(entries);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err,
                    "skipping unparsable discovery path");
            }
        }
    }
    Ok(Vec::new())
}

fn load_path(path: &Path) -> Result<Vec<ServerEntry>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| WardenError::invalid(format!("cannot read {}: {e}", path.display())))?;
    parse_discovery_document(&content)
}
