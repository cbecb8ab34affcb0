use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use warden_types::{Result, TlpLevel, WardenError};

/// Outcome of a clearance check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClearanceDecision {
    Allow,
    Block,
}

/// One recorded clearance decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearanceDecisionRecord {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub agent_clearance: Option<TlpLevel>,
    /// The classification the task demanded.
    pub tlp_level: TlpLevel,
    pub decision: ClearanceDecision,
    pub reason: String,
    pub contract_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// Filters for reading back decisions.
#[derive(Debug, Clone, Default)]
pub struct ClearanceQuery {
    pub agent_id: Option<Uuid>,
    pub tlp_level: Option<TlpLevel>,
    pub decision: Option<ClearanceDecision>,
    pub limit: Option<usize>,
}

/// Classification gate: a delegatee is admitted only when its clearance
/// dominates the contract's TLP classification. Every decision, allow or
/// block, is appended to the decision log.
#[derive(Debug, Default)]
pub struct ClassificationEnforcer {
    decisions: RwLock<Vec<ClearanceDecisionRecord>>,
}

impl ClassificationEnforcer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the gate. `agent_clearance` is the strongest clearance the agent
    /// holds across its capabilities; `None` means no registered clearance,
    /// which blocks everything above CLEAR.
    pub async fn enforce(
        &self,
        agent_id: Uuid,
        agent_name: &str,
        agent_clearance: Option<TlpLevel>,
        required: TlpLevel,
        contract_id: Option<Uuid>,
    ) -> Result<()> {
        let allowed = match agent_clearance {
            Some(clearance) => clearance.dominates(required),
            None => required == TlpLevel::Clear,
        };

        let (decision, reason) = if allowed {
            (
                ClearanceDecision::Allow,
                match agent_clearance {
                    Some(clearance) => format!("{clearance} dominates {required}"),
                    None => "unclassified agent admitted for CLEAR work".to_string(),
                },
            )
        } else {
            (
                ClearanceDecision::Block,
                match agent_clearance {
                    Some(clearance) => {
                        format!("{clearance} does not dominate {required}")
                    }
                    None => format!("agent has no registered clearance, task requires {required}"),
                },
            )
        };

        tracing::debug!(
            %agent_id,
            required = %required,
            ?agent_clearance,
            ?decision,
            "clearance decision",
        );

        self.decisions.write().await.push(ClearanceDecisionRecord {
            agent_id,
            agent_name: agent_name.to_string(),
            agent_clearance,
            tlp_level: required,
            decision,
            reason,
            contract_id,
            timestamp: Utc::now(),
        });

        if allowed {
            Ok(())
        } else {
            Err(WardenError::ClearanceInsufficient {
                agent_clearance,
                required,
            })
        }
    }

    pub async fn query(&self, query: &ClearanceQuery) -> Vec<ClearanceDecisionRecord> {
        let decisions = self.decisions.read().await;
        let mut matched: Vec<ClearanceDecisionRecord> = decisions
            .iter()
            .filter(|d| query.agent_id.is_none_or(|id| d.agent_id == id))
            .filter(|d| query.tlp_level.is_none_or(|level| d.tlp_level == level))
            .filter(|d| query.decision.is_none_or(|dec| d.decision == dec))
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        matched
    }
}
