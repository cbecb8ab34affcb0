use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_events::{ControlPlaneEvent, EventBus};
use warden_types::{AgentRef, AuthorityLevel, Result, WardenError};

/// A manual-override request against a blocking firebreak.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRequest {
    pub requesting_agent: AgentRef,
    pub target_agent: AgentRef,
    pub authority_level: AuthorityLevel,
    pub reason: String,
    pub justification: String,
    #[serde(default)]
    pub context: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

/// A stored override, pending until a human decides or it expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub override_id: Uuid,
    pub request: OverrideRequest,
    pub status: OverrideStatus,
    pub created_at: DateTime<Utc>,
}

/// Record of an emergency escalation. Escalation never grants a bypass by
/// itself; a human must approve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyEscalation {
    pub escalation_id: Uuid,
    pub status: String,
    pub emergency_contact: String,
    pub timestamp: DateTime<Utc>,
    pub bypass_granted: bool,
    pub reason: String,
}

/// Stores pending overrides and emergency escalations. Expiry is applied
/// lazily on read and via `sweep_expired`.
#[derive(Debug, Default)]
pub struct OverrideManager {
    overrides: DashMap<Uuid, OverrideRecord>,
    escalations: DashMap<Uuid, EmergencyEscalation>,
    events: EventBus,
}

impl OverrideManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Submit an override request. The requester's authority must dominate
    /// the authority the firebreak demanded.
    pub fn request_override(
        &self,
        request: OverrideRequest,
        required_authority: AuthorityLevel,
    ) -> Result<OverrideRecord> {
        if !request.authority_level.dominates(required_authority) {
            return Err(WardenError::invalid(format!(
                "Insufficient authority level. Required: {required_authority}",
            )));
        }
        if request.expires_at <= Utc::now() {
            return Err(WardenError::invalid("override expiry is in the past"));
        }
        let record = OverrideRecord {
            override_id: Uuid::new_v4(),
            request,
            status: OverrideStatus::Pending,
            created_at: Utc::now(),
        };
        tracing::info!(override_id = %record.override_id,
            authority = %record.request.authority_level, "override requested");
        self.overrides.insert(record.override_id, record.clone());
        self.events.publish(ControlPlaneEvent::OverrideRequested {
            override_id: record.override_id,
            requesting_agent: record.request.requesting_agent.clone(),
            target_agent: record.request.target_agent.clone(),
            authority_level: record.request.authority_level,
        });
        Ok(record)
    }

    /// Fetch an override, lazily expiring it when past its deadline.
    pub fn get_override(&self, override_id: Uuid) -> Option<OverrideRecord> {
        let mut record = self.overrides.get_mut(&override_id)?;
        if record.status == OverrideStatus::Pending && record.request.expires_at <= Utc::now() {
            record.status = OverrideStatus::Expired;
        }
        Some(record.clone())
    }

    pub fn pending_overrides(&self) -> Vec<OverrideRecord> {
        let now = Utc::now();
        let mut pending = Vec::new();
        for mut entry in self.overrides.iter_mut() {
            if entry.status == OverrideStatus::Pending && entry.request.expires_at <= now {
                entry.status = OverrideStatus::Expired;
            }
            if entry.status == OverrideStatus::Pending {
                pending.push(entry.clone());
            }
        }
        pending.sort_by_key(|r| r.created_at);
        pending
    }

    /// Periodic sweep marking overdue pending overrides as expired.
    /// Returns how many were expired.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut expired = 0;
        for mut entry in self.overrides.iter_mut() {
            if entry.status == OverrideStatus::Pending && entry.request.expires_at <= now {
                entry.status = OverrideStatus::Expired;
                expired += 1;
            }
        }
        expired
    }

    pub fn resolve_override(&self, override_id: Uuid, approve: bool) -> Result<OverrideRecord> {
        let mut record = self
            .overrides
            .get_mut(&override_id)
            .ok_or_else(|| WardenError::not_found("override", override_id))?;
        if record.status != OverrideStatus::Pending {
            return Err(WardenError::invalid(format!(
                "override {} is not pending",
                override_id,
            )));
        }
        record.status = if approve {
            OverrideStatus::Approved
        } else {
            OverrideStatus::Rejected
        };
        Ok(record.clone())
    }

    /// Record an emergency escalation. `bypass_granted` is always false;
    /// human approval happens out of band.
    pub fn escalate_emergency(
        &self,
        reason: impl Into<String>,
        emergency_contact: impl Into<String>,
    ) -> EmergencyEscalation {
        let escalation = EmergencyEscalation {
            escalation_id: Uuid::new_v4(),
            status: "escalated".to_string(),
            emergency_contact: emergency_contact.into(),
            timestamp: Utc::now(),
            bypass_granted: false,
            reason: reason.into(),
        };
        tracing::warn!(escalation_id = %escalation.escalation_id,
            "emergency escalation recorded");
        self.escalations
            .insert(escalation.escalation_id, escalation.clone());
        escalation
    }

    pub fn get_escalation(&self, escalation_id: Uuid) -> Option<EmergencyEscalation> {
        self.escalations.get(&escalation_id).map(|e| e.clone())
    }
}
