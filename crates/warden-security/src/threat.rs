use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_types::{AgentRef, ResourceRequirements, ThreatSeverity, TlpLevel};

/// Categories of pre-admission threats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    PermissionEscalation,
    ReputationGaming,
    AbusePattern,
    Anomaly,
}

impl ThreatType {
    pub fn as_str(self) -> &'static str {
        match self {
            ThreatType::PermissionEscalation => "permission_escalation",
            ThreatType::ReputationGaming => "reputation_gaming",
            ThreatType::AbusePattern => "abuse_pattern",
            ThreatType::Anomaly => "anomaly",
        }
    }
}

/// A single detector finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatFinding {
    pub threat_type: ThreatType,
    pub severity: ThreatSeverity,
    pub description: String,
    /// Which sub-conditions fired, for detectors with more than one.
    #[serde(default)]
    pub sub_findings: Vec<String>,
    pub delegator_id: Uuid,
    pub delegatee_id: Uuid,
    pub detected_at: DateTime<Utc>,
}

impl ThreatFinding {
    pub fn new(
        threat_type: ThreatType,
        severity: ThreatSeverity,
        delegator_id: Uuid,
        delegatee_id: Uuid,
        description: impl Into<String>,
    ) -> Self {
        Self {
            threat_type,
            severity,
            description: description.into(),
            sub_findings: Vec::new(),
            delegator_id,
            delegatee_id,
            detected_at: Utc::now(),
        }
    }

    pub fn with_sub_findings(mut self, sub_findings: Vec<String>) -> Self {
        self.sub_findings = sub_findings;
        self
    }
}

/// What the validator tells the caller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityAction {
    Allow,
    AllowWithWarning,
    Block,
}

impl SecurityAction {
    /// Severity-to-action mapping: low/medium warn, high/critical block.
    pub fn for_severity(severity: Option<ThreatSeverity>) -> Self {
        match severity {
            None => SecurityAction::Allow,
            Some(ThreatSeverity::Low) | Some(ThreatSeverity::Medium) => {
                SecurityAction::AllowWithWarning
            }
            Some(ThreatSeverity::High) | Some(ThreatSeverity::Critical) => SecurityAction::Block,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SecurityAction::Allow => "allow",
            SecurityAction::AllowWithWarning => "allow_with_warning",
            SecurityAction::Block => "block",
        }
    }
}

/// The validator's verdict for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityVerdict {
    pub action: SecurityAction,
    pub worst_severity: Option<ThreatSeverity>,
    pub findings: Vec<ThreatFinding>,
}

impl SecurityVerdict {
    pub fn is_blocked(&self) -> bool {
        self.action == SecurityAction::Block
    }
}

/// Everything the detectors look at for one delegation request.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub delegator: AgentRef,
    pub delegatee: AgentRef,
    pub scopes: Vec<String>,
    pub actions: Vec<String>,
    /// Depth the request would land at.
    pub delegation_depth: u32,
    pub child_tlp: TlpLevel,
    pub parent_tlp: Option<TlpLevel>,
    /// Free-text justification for a TLP escalation, from request metadata.
    pub tlp_justification: Option<String>,
    pub resource_requirements: Option<ResourceRequirements>,
    pub delegatee_success_rate: Option<f64>,
    pub delegatee_total_completions: u64,
    pub estimated_duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ValidationContext {
    pub fn new(delegator: AgentRef, delegatee: AgentRef) -> Self {
        Self {
            delegator,
            delegatee,
            scopes: Vec::new(),
            actions: Vec::new(),
            delegation_depth: 0,
            child_tlp: TlpLevel::Clear,
            parent_tlp: None,
            tlp_justification: None,
            resource_requirements: None,
            delegatee_success_rate: None,
            delegatee_total_completions: 0,
            estimated_duration_ms: 0,
            timestamp: Utc::now(),
        }
    }
}
