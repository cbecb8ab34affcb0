use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::sync::watch;

use warden_events::{ControlPlaneEvent, EventBus};
use warden_types::{Result, WardenError};

use crate::config::{McpConfig, discover_servers};
use crate::server::{ServerEntry, ServerStatus, Transport};

/// Outcome of probing one server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub name: String,
    pub status: ServerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Registry statistics by tier, transport, and status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpStatistics {
    pub total_servers: usize,
    pub by_tier: HashMap<String, usize>,
    pub by_transport: HashMap<String, usize>,
    pub by_status: HashMap<String, usize>,
}

/// Tool-server registry with health probing. Probing runs independently of
/// contract admission; a probe in flight never blocks anything else.
pub struct McpHealthRegistry {
    config: McpConfig,
    servers: DashMap<String, ServerEntry>,
    http: reqwest::Client,
    monitor: Mutex<Option<watch::Sender<bool>>>,
    events: EventBus,
}

impl McpHealthRegistry {
    pub fn new(config: McpConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            config,
            servers: DashMap::new(),
            http,
            monitor: Mutex::new(None),
            events: EventBus::default(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Load server entries from the configured discovery paths
    /// (first-wins) and register them.
    pub fn initialize(&self) -> Result<usize> {
        let entries = discover_servers(&self.config.discovery_paths)?;
        let count = entries.len();
        for entry in entries {
            self.register(entry);
        }
        Ok(count)
    }

    pub fn register(&self, mut entry: ServerEntry) {
        if !entry.enabled {
            entry.status = ServerStatus::Disabled;
        }
        self.servers.insert(entry.name.clone(), entry);
    }

    pub fn get(&self, name: &str) -> Option<ServerEntry> {
        self.servers.get(name).map(|e| e.clone())
    }

    pub fn list(&self) -> Vec<ServerEntry> {
        let mut servers: Vec<ServerEntry> =
            self.servers.iter().map(|e| e.value().clone()).collect();
        servers.sort_by(|a, b| a.name.cmp(&b.name));
        servers
    }

    /// Probe one server and record the outcome.
    pub async fn check_server_health(&self, name: &str) -> Result<HealthReport> {
        let entry = self
            .get(name)
            .ok_or_else(|| WardenError::not_found("mcp server", name))?;

        let report = if !entry.enabled {
            HealthReport {
                name: entry.name.clone(),
                status: ServerStatus::Disabled,
                error: None,
            }
        } else {
            self.probe(&entry).await
        };

        if let Some(mut stored) = self.servers.get_mut(name) {
            if stored.status != report.status {
                self.events.publish(ControlPlaneEvent::ServerHealthChanged {
                    name: stored.name.clone(),
                    old_status: stored.status,
                    new_status: report.status,
                });
            }
            stored.status = report.status;
            stored.last_checked = Some(Utc::now());
            stored.error = report.error.clone();
        }
        Ok(report)
    }

    /// Probe every registered server.
    pub async fn check_all_health(&self) -> Vec<HealthReport> {
        let names: Vec<String> = self.servers.iter().map(|e| e.key().clone()).collect();
        let mut reports = Vec::with_capacity(names.len());
        for name in names {
            match self.check_server_health(&name).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    // A vanished entry is a local bookkeeping issue, not a
                    // probe failure.
                    tracing::warn!(server = %name, error = %err, "health check skipped");
                }
            }
        }
        reports.sort_by(|a, b| a.name.cmp(&b.name));
        reports
    }

    /// Start the periodic probe loop. Idempotent: a second call while the
    /// loop runs is a no-op.
    pub async fn start_health_monitoring(self: std::sync::Arc<Self>) {
        let mut monitor = self.monitor.lock().await;
        if monitor.is_some() {
            return;
        }
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        *monitor = Some(shutdown_tx);

        let registry = self.clone();
        let interval = Duration::from_secs(registry.config.health_check_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reports = registry.check_all_health().await;
                        let down = reports
                            .iter()
                            .filter(|r| r.status != ServerStatus::Available
                                && r.status != ServerStatus::Disabled)
                            .count();
                        tracing::debug!(total = reports.len(), down, "health sweep complete");
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("health monitoring stopped");
                            break;
                        }
                    }
                }
            }
        });
    }

    /// Stop the probe loop. Idempotent.
    pub async fn stop_health_monitoring(&self) {
        if let Some(shutdown) = self.monitor.lock().await.take() {
            let _ = shutdown.send(true);
        }
    }

    pub fn statistics(&self) -> McpStatistics {
        let mut stats = McpStatistics {
            total_servers: self.servers.len(),
            ..Default::default()
        };
        for entry in self.servers.iter() {
            *stats
                .by_tier
                .entry(entry.tier.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_transport
                .entry(entry.transport.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_status
                .entry(entry.status.as_str().to_string())
                .or_default() += 1;
        }
        stats
    }

    async fn probe(&self, entry: &ServerEntry) -> HealthReport {
        let (status, error) = match entry.transport {
            Transport::Stdio => match &entry.command {
                Some(command) if command_available(command) => (ServerStatus::Available, None),
                Some(command) => (
                    ServerStatus::Unavailable,
                    Some(format!("command '{command}' not found on PATH")),
                ),
                None => (
                    ServerStatus::Error,
                    Some("stdio server has no command".to_string()),
                ),
            },
            Transport::Http | Transport::Url => match &entry.url {
                Some(url) => match self.http.get(url).send().await {
                    Ok(response) if response.status().is_success() => {
                        (ServerStatus::Available, None)
                    }
                    Ok(response) => (
                        ServerStatus::Unavailable,
                        Some(format!("probe returned {}", response.status())),
                    ),
                    Err(err) => (ServerStatus::Unavailable, Some(err.to_string())),
                },
                None => (
                    ServerStatus::Error,
                    Some("url server has no url".to_string()),
                ),
            },
        };

        HealthReport {
            name: entry.name.clone(),
            status,
            error,
        }
    }
}

/// Whether `command` resolves to an executable: directly for explicit
/// paths, otherwise by scanning PATH.
fn command_available(command: &str) -> bool {
    let candidate = Path::new(command);
    if candidate.components().count() > 1 {
        return candidate.is_file();
    }
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(command).is_file())
}
