use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of audit events recorded by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    DelegationCreated,
    DelegationVerified,
    ContractCancelled,
    SecurityThreatDetected,
    AdmissionBlocked,
    ClearanceDecision,
    ReputationUpdated,
    OverrideRequested,
    EmergencyEscalated,
}

impl AuditEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEventKind::DelegationCreated => "delegation_created",
            AuditEventKind::DelegationVerified => "delegation_verified",
            AuditEventKind::ContractCancelled => "contract_cancelled",
            AuditEventKind::SecurityThreatDetected => "security_threat_detected",
            AuditEventKind::AdmissionBlocked => "admission_blocked",
            AuditEventKind::ClearanceDecision => "clearance_decision",
            AuditEventKind::ReputationUpdated => "reputation_updated",
            AuditEventKind::OverrideRequested => "override_requested",
            AuditEventKind::EmergencyEscalated => "emergency_escalated",
        }
    }
}

/// An append-only audit record. Events are hash-chained by the audit log;
/// `previous_hash`/`hash` are filled in at append time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub event_type: AuditEventKind,
    pub timestamp: DateTime<Utc>,
    pub agent_id: Uuid,
    pub agent_name: String,
    pub event_data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_contract_id: Option<Uuid>,
    pub source_system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    #[serde(default)]
    pub hash: String,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventKind,
        agent_id: Uuid,
        agent_name: impl Into<String>,
        event_data: serde_json::Value,
        source_system: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            timestamp: Utc::now(),
            agent_id,
            agent_name: agent_name.into(),
            event_data,
            delegation_contract_id: None,
            source_system: source_system.into(),
            previous_hash: None,
            hash: String::new(),
        }
    }

    pub fn with_contract(mut self, contract_id: Uuid) -> Self {
        self.delegation_contract_id = Some(contract_id);
        self
    }

    /// The canonical byte string the hash chain covers.
    pub fn hash_input(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:{}",
            self.event_id,
            self.timestamp.timestamp_nanos_opt().unwrap_or(0),
            self.event_type.as_str(),
            self.agent_id,
            self.event_data,
            self.delegation_contract_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
            self.previous_hash.as_deref().unwrap_or("genesis"),
        )
    }
}
