use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contract::{
    AgentRef, FirebreakLimits, ReputationRequirements, ResourceRequirements, RetryPolicy,
    SuccessCriteria, VerificationPolicy,
};
use crate::error::{Result, WardenError};
use crate::tlp::TlpLevel;
use crate::token::PermissionToken;

fn default_priority() -> u8 {
    5
}

fn default_timeout_ms() -> u64 {
    300_000
}

fn default_tlp() -> TlpLevel {
    TlpLevel::Clear
}

/// A delegation request as submitted on the wire. Unknown top-level fields
/// are preserved in `metadata` via the flattened map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRequest {
    pub task_id: String,
    pub task_description: String,
    pub delegator: AgentRef,
    /// When absent, the Capability Registry binds the best-matching agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegatee: Option<AgentRef>,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub verification_policy: VerificationPolicy,
    #[serde(default)]
    pub success_criteria: SuccessCriteria,
    /// Requested child token; attenuated against the parent contract's token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_token: Option<PermissionToken>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_requirements: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_tlp")]
    pub tlp_classification: TlpLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_contract_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebreak: Option<FirebreakLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation_requirements: Option<ReputationRequirements>,
    /// Estimated value at stake, used by the firebreak gate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_value: Option<f64>,
    #[serde(default)]
    pub involves_critical_systems: bool,
    #[serde(default)]
    pub is_external_delegation: bool,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl DelegationRequest {
    pub fn new(
        task_id: impl Into<String>,
        task_description: impl Into<String>,
        delegator: AgentRef,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_description: task_description.into(),
            delegator,
            delegatee: None,
            required_capabilities: Vec::new(),
            verification_policy: VerificationPolicy::default(),
            success_criteria: SuccessCriteria::default(),
            permission_token: None,
            resource_requirements: None,
            retry_policy: None,
            priority: default_priority(),
            timeout_ms: default_timeout_ms(),
            tlp_classification: default_tlp(),
            parent_contract_id: None,
            firebreak: None,
            reputation_requirements: None,
            estimated_value: None,
            involves_critical_systems: false,
            is_external_delegation: false,
            metadata: serde_json::Map::new(),
        }
    }

    /// Structural validation before any gate runs.
    pub fn validate(&self) -> Result<()> {
        if self.task_id.is_empty() {
            return Err(WardenError::invalid("task_id must not be empty"));
        }
        if self.task_description.is_empty() {
            return Err(WardenError::invalid("task_description must not be empty"));
        }
        if !(1..=10).contains(&self.priority) {
            return Err(WardenError::invalid(format!(
                "priority must be in 1..=10, got {}",
                self.priority,
            )));
        }
        if self.timeout_ms == 0 {
            return Err(WardenError::invalid("timeout_ms must be positive"));
        }
        if let Some(threshold) = self.success_criteria.quality_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(WardenError::invalid(format!(
                    "quality_threshold must be in [0, 1], got {threshold}",
                )));
            }
        }
        Ok(())
    }
}
