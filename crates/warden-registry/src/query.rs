use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_types::TlpLevel;

/// Query against the capability registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityQuery {
    /// Capability ids or tags the task needs. Empty matches nothing.
    #[serde(default)]
    pub required_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_completion_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_tlp_clearance: Option<TlpLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_success_rate: Option<f64>,
    #[serde(default)]
    pub exclude_agents: Vec<Uuid>,
    #[serde(default)]
    pub only_available: bool,
}

/// One ranked match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMatch {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub score: f64,
    pub matched_capabilities: Vec<String>,
    /// 1-based position after ranking.
    pub rank: usize,
}

/// Options for `rank_agents`.
#[derive(Debug, Clone, Copy)]
pub struct RankOptions {
    /// Blend between matched-capability confidence and coverage, in [0, 1].
    pub confidence_weight: f64,
    pub consider_workload: bool,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            confidence_weight: 0.7,
            consider_workload: true,
        }
    }
}

/// Flat row for `query_capabilities`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityRow {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub capability_id: String,
    pub name: String,
    pub confidence_level: f64,
    pub tlp_clearance: TlpLevel,
    pub tags: Vec<String>,
}

/// Registry-wide statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStatistics {
    pub total_agents: usize,
    pub total_capabilities: usize,
    pub avg_capabilities_per_agent: f64,
    pub avg_confidence: f64,
    pub available_agents: usize,
    /// Capability count per category (tag, or capability id when untagged).
    pub capability_distribution: HashMap<String, usize>,
}
