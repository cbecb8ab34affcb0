use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_events::{ControlPlaneEvent, EventBus};
use warden_store::AuditLog;
use warden_types::{
    AuditEvent, AuditEventKind, ReputationRequirements, Result, WardenError,
};

use crate::record::{ReputationDimension, ReputationRecord};

/// Tuning knobs for the reputation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReputationConfig {
    /// EMA smoothing factor.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

fn default_alpha() -> f64 {
    0.3
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
        }
    }
}

/// EMA-based multi-dimensional reputation engine. Updates for a single
/// agent are serialized by the per-key map lock; different agents update
/// independently.
pub struct ReputationEngine {
    records: DashMap<Uuid, ReputationRecord>,
    audit: Arc<dyn AuditLog>,
    config: ReputationConfig,
    events: EventBus,
}

impl ReputationEngine {
    pub fn new(audit: Arc<dyn AuditLog>, config: ReputationConfig) -> Self {
        Self {
            records: DashMap::new(),
            audit,
            config,
            events: EventBus::default(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn get(&self, agent_id: Uuid) -> Option<ReputationRecord> {
        self.records.get(&agent_id).map(|r| r.clone())
    }

    pub fn get_or_default(&self, agent_id: Uuid) -> ReputationRecord {
        self.records
            .entry(agent_id)
            .or_insert_with(|| ReputationRecord::new(agent_id))
            .clone()
    }

    /// Record a successful terminal outcome: reliability and quality observe
    /// 1.0; speed observes `clamp(target/actual, 0, 1)`.
    pub async fn record_success(
        &self,
        agent_id: Uuid,
        agent_name: &str,
        contract_id: Uuid,
        target_time_ms: u64,
        actual_time_ms: u64,
    ) -> Result<ReputationRecord> {
        let alpha = self.config.alpha;
        let speed_observation = if actual_time_ms == 0 {
            1.0
        } else {
            (target_time_ms as f64 / actual_time_ms as f64).clamp(0.0, 1.0)
        };
        let record = {
            let mut entry = self
                .records
                .entry(agent_id)
                .or_insert_with(|| ReputationRecord::new(agent_id));
            entry.observe(ReputationDimension::Reliability, 1.0, alpha);
            entry.observe(ReputationDimension::Quality, 1.0, alpha);
            entry.observe(ReputationDimension::Speed, speed_observation, alpha);
            entry.consecutive_successes += 1;
            entry.consecutive_failures = 0;
            entry.total_completions += 1;
            entry.clone()
        };
        self.audit_update(agent_id, agent_name, contract_id, "success", &record)
            .await;
        Ok(record)
    }

    /// Record a failed or timed-out terminal outcome: reliability and
    /// quality observe 0.0.
    pub async fn record_failure(
        &self,
        agent_id: Uuid,
        agent_name: &str,
        contract_id: Uuid,
    ) -> Result<ReputationRecord> {
        let alpha = self.config.alpha;
        let record = {
            let mut entry = self
                .records
                .entry(agent_id)
                .or_insert_with(|| ReputationRecord::new(agent_id));
            entry.observe(ReputationDimension::Reliability, 0.0, alpha);
            entry.observe(ReputationDimension::Quality, 0.0, alpha);
            entry.consecutive_failures += 1;
            entry.consecutive_successes = 0;
            entry.total_completions += 1;
            entry.clone()
        };
        self.audit_update(agent_id, agent_name, contract_id, "failure", &record)
            .await;
        Ok(record)
    }

    /// A security-gate block observes 0.0 on the security dimension only.
    pub async fn record_security_block(
        &self,
        agent_id: Uuid,
        agent_name: &str,
        contract_id: Uuid,
    ) -> Result<ReputationRecord> {
        let alpha = self.config.alpha;
        let record = {
            let mut entry = self
                .records
                .entry(agent_id)
                .or_insert_with(|| ReputationRecord::new(agent_id));
            entry.observe(ReputationDimension::Security, 0.0, alpha);
            entry.clone()
        };
        self.audit_update(agent_id, agent_name, contract_id, "security_block", &record)
            .await;
        Ok(record)
    }

    pub fn add_specialization(&self, agent_id: Uuid, specialization: impl Into<String>) {
        let mut entry = self
            .records
            .entry(agent_id)
            .or_insert_with(|| ReputationRecord::new(agent_id));
        let specialization = specialization.into();
        if !entry.specializations.contains(&specialization) {
            entry.specializations.push(specialization);
        }
    }

    /// Admission gate: the delegatee must meet every non-null field of the
    /// contract's reputation requirements.
    pub fn check_requirements(
        &self,
        agent_id: Uuid,
        requirements: &ReputationRequirements,
    ) -> Result<()> {
        let record = self.get_or_default(agent_id);
        let checks = [
            ("reliability", record.reliability, requirements.min_reliability),
            ("speed", record.speed, requirements.min_speed),
            ("quality", record.quality, requirements.min_quality),
            ("security", record.security, requirements.min_security),
            ("aggregate", record.aggregate, requirements.min_aggregate),
        ];
        for (dimension, score, threshold) in checks {
            if let Some(threshold) = threshold {
                if score < threshold {
                    return Err(WardenError::ReputationInsufficient {
                        dimension: dimension.into(),
                        score,
                        threshold,
                    });
                }
            }
        }
        Ok(())
    }

    /// Telemetry failures are logged and swallowed; a reputation update must
    /// never fail because the audit backend hiccuped.
    async fn audit_update(
        &self,
        agent_id: Uuid,
        agent_name: &str,
        contract_id: Uuid,
        outcome: &str,
        record: &ReputationRecord,
    ) {
        let event = AuditEvent::new(
            AuditEventKind::ReputationUpdated,
            agent_id,
            agent_name,
            serde_json::json!({
                "outcome": outcome,
                "reliability": record.reliability,
                "speed": record.speed,
                "quality": record.quality,
                "security": record.security,
                "aggregate": record.aggregate,
            }),
            "reputation_engine",
        )
        .with_contract(contract_id);
        if let Err(err) = self.audit.append(event).await {
            tracing::warn!(%agent_id, error = %err, "failed to audit reputation update");
        }
        self.events.publish(ControlPlaneEvent::ReputationUpdated {
            agent_id,
            outcome: outcome.to_string(),
            reliability: record.reliability,
            speed: record.speed,
            quality: record.quality,
            security: record.security,
            aggregate: record.aggregate,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_store::{AuditQuery, InMemoryAuditLog};

    fn engine() -> ReputationEngine {
        ReputationEngine::new(
            Arc::new(InMemoryAuditLog::new()),
            ReputationConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_success_moves_reliability_by_alpha() {
        let engine = engine();
        let agent = Uuid::new_v4();
        let prev = engine.get_or_default(agent).reliability;

        let record = engine
            .record_success(agent, "worker", Uuid::new_v4(), 1000, 1000)
            .await
            .unwrap();
        // new - prev = alpha * (1 - prev)
        let expected_delta = 0.3 * (1.0 - prev);
        assert!((record.reliability - prev - expected_delta).abs() < 1e-9);
        assert_eq!(record.consecutive_successes, 1);
        assert_eq!(record.total_completions, 1);
    }

    #[tokio::test]
    async fn test_speed_observation_is_target_over_actual() {
        let engine = engine();
        let agent = Uuid::new_v4();

        // Twice as slow as target: observation = 0.5.
        let record = engine
            .record_success(agent, "worker", Uuid::new_v4(), 1000, 2000)
            .await
            .unwrap();
        let expected = 0.3 * 0.5 + 0.7 * 0.5;
        assert!((record.speed - expected).abs() < 1e-9);

        // Faster than target clamps at 1.0.
        let record = engine
            .record_success(agent, "worker", Uuid::new_v4(), 1000, 100)
            .await
            .unwrap();
        assert!(record.speed <= 1.0);
    }

    #[tokio::test]
    async fn test_failure_resets_success_streak() {
        let engine = engine();
        let agent = Uuid::new_v4();
        engine
            .record_success(agent, "worker", Uuid::new_v4(), 1000, 1000)
            .await
            .unwrap();
        engine
            .record_success(agent, "worker", Uuid::new_v4(), 1000, 1000)
            .await
            .unwrap();
        let record = engine
            .record_failure(agent, "worker", Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(record.consecutive_successes, 0);
        assert_eq!(record.consecutive_failures, 1);
        assert_eq!(record.total_completions, 3);
    }

    #[tokio::test]
    async fn test_security_block_touches_only_security() {
        let engine = engine();
        let agent = Uuid::new_v4();
        let before = engine.get_or_default(agent);
        let record = engine
            .record_security_block(agent, "worker", Uuid::new_v4())
            .await
            .unwrap();
        assert!(record.security < before.security);
        assert!((record.reliability - before.reliability).abs() < 1e-9);
        assert!((record.quality - before.quality).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_requirements_gate() {
        let engine = engine();
        let agent = Uuid::new_v4();

        let lenient = ReputationRequirements {
            min_reliability: Some(0.4),
            ..Default::default()
        };
        assert!(engine.check_requirements(agent, &lenient).is_ok());

        let strict = ReputationRequirements {
            min_reliability: Some(0.9),
            ..Default::default()
        };
        let err = engine.check_requirements(agent, &strict).unwrap_err();
        match err {
            WardenError::ReputationInsufficient {
                dimension,
                score,
                threshold,
            } => {
                assert_eq!(dimension, "reliability");
                assert!((score - 0.5).abs() < 1e-9);
                assert!((threshold - 0.9).abs() < 1e-9);
            }
            other => panic!("expected ReputationInsufficient, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_updates_publish_events() {
        let engine = engine();
        let mut rx = engine.events().subscribe();
        let agent = Uuid::new_v4();
        engine
            .record_success(agent, "worker", Uuid::new_v4(), 1000, 1000)
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            ControlPlaneEvent::ReputationUpdated {
                agent_id,
                outcome,
                reliability,
                ..
            } => {
                assert_eq!(agent_id, agent);
                assert_eq!(outcome, "success");
                assert!((reliability - 0.65).abs() < 1e-9);
            }
            other => panic!("expected ReputationUpdated, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_updates_are_audited() {
        let audit = Arc::new(InMemoryAuditLog::new());
        let engine = ReputationEngine::new(audit.clone(), ReputationConfig::default());
        let agent = Uuid::new_v4();
        let contract = Uuid::new_v4();
        engine
            .record_success(agent, "worker", contract, 1000, 900)
            .await
            .unwrap();

        let events = audit
            .query(&AuditQuery {
                agent_id: Some(agent),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].event_type,
            warden_types::AuditEventKind::ReputationUpdated,
        );
        assert_eq!(events[0].delegation_contract_id, Some(contract));
    }
}
