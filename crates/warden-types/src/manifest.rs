use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contract::ResourceRequirements;
use crate::tlp::TlpLevel;

/// Agent availability states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Busy,
    Offline,
    Maintenance,
}

impl Default for Availability {
    fn default() -> Self {
        Availability::Available
    }
}

/// A single declared capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Capability {
    /// Stable slug, e.g. `content_search`.
    pub capability_id: String,
    pub name: String,
    pub description: String,
    /// Self-assessed confidence in [0, 1].
    pub confidence_level: f64,
    pub completion_time_estimate_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_completions: Option<u64>,
    #[serde(default)]
    pub resource_requirements: ResourceRequirements,
    #[serde(default)]
    pub supported_patterns: Vec<String>,
    #[serde(default)]
    pub limitations: Vec<String>,
    pub tlp_clearance: TlpLevel,
    #[serde(default)]
    pub tags: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl Capability {
    pub fn new(capability_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            capability_id: capability_id.into(),
            name: name.into(),
            description: String::new(),
            confidence_level: 0.5,
            completion_time_estimate_ms: 60_000,
            success_rate: None,
            successful_completions: None,
            resource_requirements: ResourceRequirements::default(),
            supported_patterns: Vec::new(),
            limitations: Vec::new(),
            tlp_clearance: TlpLevel::Clear,
            tags: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence_level = confidence;
        self
    }

    pub fn with_clearance(mut self, clearance: TlpLevel) -> Self {
        self.tlp_clearance = clearance;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Self-declared capability catalog of an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapabilityManifest {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub version: String,
    pub capabilities: Vec<Capability>,
    /// Arithmetic mean of `confidence_level` over `capabilities`.
    pub overall_confidence: f64,
    #[serde(default)]
    pub availability: Availability,
    /// Active contracts currently bound to this agent.
    #[serde(default)]
    pub current_workload: u32,
    pub max_concurrent_tasks: u32,
    #[serde(default)]
    pub specializations: Vec<String>,
    #[serde(default)]
    pub preferred_task_types: Vec<String>,
    #[serde(default)]
    pub avoided_task_types: Vec<String>,
    #[serde(default)]
    pub reputation_score: f64,
    #[serde(default)]
    pub total_completions: u64,
    #[serde(default)]
    pub avg_completion_time_ms: u64,
}

impl AgentCapabilityManifest {
    pub fn new(agent_id: Uuid, agent_name: impl Into<String>) -> Self {
        Self {
            agent_id,
            agent_name: agent_name.into(),
            version: "1.0.0".into(),
            capabilities: Vec::new(),
            overall_confidence: 0.0,
            availability: Availability::Available,
            current_workload: 0,
            max_concurrent_tasks: 3,
            specializations: Vec::new(),
            preferred_task_types: Vec::new(),
            avoided_task_types: Vec::new(),
            reputation_score: 0.5,
            total_completions: 0,
            avg_completion_time_ms: 0,
        }
    }

    pub fn with_capabilities(mut self, capabilities: Vec<Capability>) -> Self {
        self.capabilities = capabilities;
        self.recompute_overall_confidence();
        self
    }

    pub fn recompute_overall_confidence(&mut self) {
        if self.capabilities.is_empty() {
            self.overall_confidence = 0.0;
        } else {
            self.overall_confidence = self
                .capabilities
                .iter()
                .map(|c| c.confidence_level)
                .sum::<f64>()
                / self.capabilities.len() as f64;
        }
    }

    pub fn capability(&self, capability_id: &str) -> Option<&Capability> {
        self.capabilities
            .iter()
            .find(|c| c.capability_id == capability_id)
    }

    pub fn has_capability(&self, capability_id: &str) -> bool {
        self.capability(capability_id).is_some()
    }

    /// The strongest clearance this agent holds across its capabilities.
    pub fn max_clearance(&self) -> Option<TlpLevel> {
        self.capabilities.iter().map(|c| c.tlp_clearance).max()
    }

    pub fn has_spare_capacity(&self) -> bool {
        self.current_workload < self.max_concurrent_tasks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_with(confidences: &[f64]) -> AgentCapabilityManifest {
        let caps = confidences
            .iter()
            .enumerate()
            .map(|(i, c)| Capability::new(format!("cap_{i}"), format!("cap {i}")).with_confidence(*c))
            .collect();
        AgentCapabilityManifest::new(Uuid::new_v4(), "agent").with_capabilities(caps)
    }

    #[test]
    fn test_overall_confidence_is_mean() {
        let m = manifest_with(&[0.2, 0.4, 0.9]);
        assert!((m.overall_confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_overall_confidence_empty() {
        let m = manifest_with(&[]);
        assert_eq!(m.overall_confidence, 0.0);
    }

    #[test]
    fn test_max_clearance() {
        let caps = vec![
            Capability::new("a", "a").with_clearance(TlpLevel::Green),
            Capability::new("b", "b").with_clearance(TlpLevel::Red),
            Capability::new("c", "c").with_clearance(TlpLevel::Clear),
        ];
        let m = AgentCapabilityManifest::new(Uuid::new_v4(), "x").with_capabilities(caps);
        assert_eq!(m.max_clearance(), Some(TlpLevel::Red));
    }

    #[test]
    fn test_spare_capacity() {
        let mut m = manifest_with(&[0.5]);
        m.max_concurrent_tasks = 2;
        m.current_workload = 1;
        assert!(m.has_spare_capacity());
        m.current_workload = 2;
        assert!(!m.has_spare_capacity());
    }
}
