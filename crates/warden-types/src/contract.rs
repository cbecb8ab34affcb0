use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WardenError};
use crate::tlp::TlpLevel;
use crate::token::PermissionToken;

/// A lightweight agent reference carried on contracts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentRef {
    pub id: Uuid,
    pub name: String,
}

impl AgentRef {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

/// How the delegator validates the delegatee's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPolicy {
    DirectInspection,
    ThirdPartyAudit,
    /// Accepted and persisted; treated as pending operator approval.
    CryptographicProof,
    HumanRequired,
    None,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        VerificationPolicy::DirectInspection
    }
}

/// What a contract must satisfy to count as successfully completed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SuccessCriteria {
    #[serde(default)]
    pub required_checks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

/// Resource envelope requested for a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub memory_mb: u64,
    #[serde(default)]
    pub cpu_cores: f64,
    #[serde(default)]
    pub network_mbps: u64,
    #[serde(default)]
    pub disk_mb: u64,
    #[serde(default)]
    pub env_vars: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Per-contract accountability limits layered on top of the global
/// firebreak configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FirebreakLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_estimated_value: Option<f64>,
    #[serde(default)]
    pub allow_external_delegation: bool,
}

/// Minimum reputation a delegatee must hold. Only non-null fields are
/// enforced at admission.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReputationRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_reliability: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_quality: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_security: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_aggregate: Option<f64>,
}

/// Contract lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Timeout,
    Cancelled,
    Revoked,
}

impl ContractStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ContractStatus::Completed
                | ContractStatus::Failed
                | ContractStatus::Timeout
                | ContractStatus::Cancelled
                | ContractStatus::Revoked
        )
    }

    /// Attempt a transition to `to`. Returns the new status or a
    /// `StateMachineViolation` if the edge is not allowed.
    ///
    /// Allowed edges:
    /// `pending -> {active, cancelled, revoked}`;
    /// `active -> {completed, failed, timeout, cancelled, revoked}`.
    pub fn transition(self, to: ContractStatus) -> Result<ContractStatus> {
        let allowed = match (self, to) {
            (ContractStatus::Pending, ContractStatus::Active)
            | (ContractStatus::Pending, ContractStatus::Cancelled)
            | (ContractStatus::Pending, ContractStatus::Revoked) => true,
            (ContractStatus::Active, ContractStatus::Completed)
            | (ContractStatus::Active, ContractStatus::Failed)
            | (ContractStatus::Active, ContractStatus::Timeout)
            | (ContractStatus::Active, ContractStatus::Cancelled)
            | (ContractStatus::Active, ContractStatus::Revoked) => true,
            _ => false,
        };
        if allowed {
            Ok(to)
        } else {
            Err(WardenError::StateMachineViolation { from: self, to })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContractStatus::Pending => "pending",
            ContractStatus::Active => "active",
            ContractStatus::Completed => "completed",
            ContractStatus::Failed => "failed",
            ContractStatus::Timeout => "timeout",
            ContractStatus::Cancelled => "cancelled",
            ContractStatus::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The atomic unit of accountability: a durable, state-machine-tracked
/// record authorizing one agent to perform a task on behalf of another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationContract {
    pub contract_id: Uuid,
    pub task_id: String,
    pub task_description: String,
    pub delegator: AgentRef,
    pub delegatee: AgentRef,
    pub required_capabilities: Vec<String>,
    pub verification_policy: VerificationPolicy,
    pub success_criteria: SuccessCriteria,
    pub permission_token: PermissionToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_requirements: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    /// 1 (low) .. 10 (critical).
    pub priority: u8,
    pub timeout_ms: u64,
    pub tlp_classification: TlpLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_contract_id: Option<Uuid>,
    pub delegation_depth: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebreak: Option<FirebreakLimits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation_requirements: Option<ReputationRequirements>,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_result: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl DelegationContract {
    /// Apply a status transition, stamping `activated_at` on the first
    /// `pending -> active` edge and `completed_at` on any terminal edge.
    pub fn apply_transition(&mut self, to: ContractStatus, now: DateTime<Utc>) -> Result<()> {
        let next = self.status.transition(to)?;
        if self.status == ContractStatus::Pending && next == ContractStatus::Active {
            self.activated_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = next;
        Ok(())
    }
}
