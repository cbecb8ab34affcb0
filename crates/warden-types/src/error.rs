use thiserror::Error;
use uuid::Uuid;

use crate::contract::ContractStatus;
use crate::tlp::TlpLevel;

/// Severity of a detected security threat. Ordering follows declaration
/// order so the worst finding can be selected with `max()`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ThreatSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreatSeverity::Low => "low",
            ThreatSeverity::Medium => "medium",
            ThreatSeverity::High => "high",
            ThreatSeverity::Critical => "critical",
        }
    }

    /// Whether this severity blocks admission.
    pub fn blocks(self) -> bool {
        matches!(self, ThreatSeverity::High | ThreatSeverity::Critical)
    }
}

impl std::fmt::Display for ThreatSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum WardenError {
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("State transition error: cannot move from {from} to {to}")]
    StateMachineViolation {
        from: ContractStatus,
        to: ContractStatus,
    },

    #[error("Clearance insufficient: agent holds {agent_clearance:?}, task requires {required}")]
    ClearanceInsufficient {
        agent_clearance: Option<TlpLevel>,
        required: TlpLevel,
    },

    #[error("Security threat detected: {threat_type} (severity {severity})")]
    SecurityThreat {
        threat_type: String,
        severity: ThreatSeverity,
    },

    #[error("Reputation insufficient: {dimension} {score:.3} < {threshold:.3}")]
    ReputationInsufficient {
        dimension: String,
        score: f64,
        threshold: f64,
    },

    #[error("Firebreak blocked delegation: {}", blocking.join(", "))]
    FirebreakBlocked { blocking: Vec<String> },

    #[error("Delegation depth {depth} exceeds max depth {max}")]
    MaxDepthExceeded { depth: u32, max: u32 },

    #[error("Delegation loop detected: {}", cycle.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(" -> "))]
    LoopDetected { cycle: Vec<Uuid> },

    #[error("Permission attenuation violation: {reason}")]
    PermissionAttenuationViolation { reason: String },

    #[error("Storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    #[error("Timeout: {reason}")]
    Timeout { reason: String },
}

impl WardenError {
    /// Stable machine-readable discriminator for logs and wire errors.
    pub fn kind(&self) -> &'static str {
        match self {
            WardenError::InvalidRequest { .. } => "invalid_request",
            WardenError::NotFound { .. } => "not_found",
            WardenError::StateMachineViolation { .. } => "state_machine_violation",
            WardenError::ClearanceInsufficient { .. } => "clearance_insufficient",
            WardenError::SecurityThreat { .. } => "security_threat",
            WardenError::ReputationInsufficient { .. } => "reputation_insufficient",
            WardenError::FirebreakBlocked { .. } => "firebreak_blocked",
            WardenError::MaxDepthExceeded { .. } => "max_depth_exceeded",
            WardenError::LoopDetected { .. } => "loop_detected",
            WardenError::PermissionAttenuationViolation { .. } => "permission_attenuation_violation",
            WardenError::StorageUnavailable { .. } => "storage_unavailable",
            WardenError::Timeout { .. } => "timeout",
        }
    }

    /// Operator guidance attached to gate rejections.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            WardenError::ClearanceInsufficient { .. } => {
                Some("register a capability with sufficient TLP clearance or lower the task classification")
            }
            WardenError::SecurityThreat { .. } => {
                Some("review the request's scopes, rate, and resource envelope")
            }
            WardenError::ReputationInsufficient { .. } => {
                Some("pick a delegatee with a stronger record or relax reputation_requirements")
            }
            WardenError::FirebreakBlocked { .. } => {
                Some("request a manual override at the required authority level")
            }
            WardenError::MaxDepthExceeded { .. } => {
                Some("flatten the delegation chain or raise max_delegation_depth")
            }
            WardenError::LoopDetected { .. } => {
                Some("delegate to an agent not already present in the chain")
            }
            WardenError::PermissionAttenuationViolation { .. } => {
                Some("narrow the child token to a subset of the parent token")
            }
            WardenError::StorageUnavailable { .. } => Some("check the data directory and retry"),
            _ => None,
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        WardenError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        WardenError::InvalidRequest {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(ThreatSeverity::Low < ThreatSeverity::Medium);
        assert!(ThreatSeverity::High < ThreatSeverity::Critical);
        assert!(!ThreatSeverity::Medium.blocks());
        assert!(ThreatSeverity::High.blocks());
    }

    #[test]
    fn test_error_kinds_are_stable() {
        let err = WardenError::MaxDepthExceeded { depth: 6, max: 5 };
        assert_eq!(err.kind(), "max_depth_exceeded");
        assert!(err.to_string().contains("max depth"));
    }

    #[test]
    fn test_gate_errors_carry_remediation() {
        let err = WardenError::FirebreakBlocked {
            blocking: vec!["high_value_delegation".into()],
        };
        assert!(err.remediation().is_some());
        assert!(err.to_string().contains("high_value_delegation"));
    }
}
