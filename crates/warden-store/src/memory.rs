use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use warden_types::{AuditEvent, DelegationContract, Result, WardenError};

use crate::filter::ContractFilter;
use crate::traits::{AuditLog, AuditQuery, ContractStore, seal_event};

/// In-memory contract store (default backend).
#[derive(Debug, Clone, Default)]
pub struct InMemoryContractStore {
    contracts: Arc<DashMap<Uuid, DelegationContract>>,
}

impl InMemoryContractStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContractStore for InMemoryContractStore {
    async fn insert(&self, contract: DelegationContract) -> Result<()> {
        match self.contracts.entry(contract.contract_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(WardenError::invalid(format!(
                "contract {} already exists",
                contract.contract_id,
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(contract);
                Ok(())
            }
        }
    }

    async fn get(&self, contract_id: Uuid) -> Result<Option<DelegationContract>> {
        Ok(self.contracts.get(&contract_id).map(|c| c.clone()))
    }

    async fn update(&self, contract: DelegationContract) -> Result<()> {
        match self.contracts.get_mut(&contract.contract_id) {
            Some(mut slot) => {
                *slot = contract;
                Ok(())
            }
            None => Err(WardenError::not_found("contract", contract.contract_id)),
        }
    }

    async fn query(&self, filter: &ContractFilter) -> Result<Vec<DelegationContract>> {
        Ok(filter.apply(self.contracts.iter().map(|entry| entry.value().clone())))
    }
}

/// In-memory, hash-chained audit log. The write lock serializes appends so
/// the chain never forks under concurrent writers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditLog {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, event: AuditEvent) -> Result<AuditEvent> {
        let mut events = self.events.write().await;
        let previous_hash = events.last().map(|e| e.hash.clone());
        let sealed = seal_event(event, previous_hash);
        events.push(sealed.clone());
        Ok(sealed)
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>> {
        let events = self.events.read().await;
        let mut matched: Vec<AuditEvent> = events
            .iter()
            .filter(|e| query.agent_id.is_none_or(|id| e.agent_id == id))
            .filter(|e| query.event_type.is_none_or(|kind| e.event_type == kind))
            .filter(|e| {
                query
                    .contract_id
                    .is_none_or(|id| e.delegation_contract_id == Some(id))
            })
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn latest_hash(&self) -> Result<Option<String>> {
        Ok(self.events.read().await.last().map(|e| e.hash.clone()))
    }

    async fn verify_integrity(&self) -> Result<bool> {
        let events = self.events.read().await;
        for (i, event) in events.iter().enumerate() {
            if i == 0 {
                if event.previous_hash.is_some() {
                    return Ok(false);
                }
            } else if event.previous_hash.as_ref() != Some(&events[i - 1].hash) {
                return Ok(false);
            }
            let resealed = seal_event(event.clone(), event.previous_hash.clone());
            if resealed.hash != event.hash {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use warden_types::{
        AgentRef, AuditEventKind, ContractStatus, PermissionToken, SuccessCriteria, TlpLevel,
        VerificationPolicy,
    };

    fn contract(status: ContractStatus, priority: u8) -> DelegationContract {
        let now = Utc::now();
        DelegationContract {
            contract_id: Uuid::new_v4(),
            task_id: "task".into(),
            task_description: "desc".into(),
            delegator: AgentRef::new(Uuid::new_v4(), "a"),
            delegatee: AgentRef::new(Uuid::new_v4(), "b"),
            required_capabilities: vec![],
            verification_policy: VerificationPolicy::None,
            success_criteria: SuccessCriteria::default(),
            permission_token: PermissionToken::new(
                vec!["fs".into()],
                vec!["read".into()],
                vec!["*".into()],
                now + Duration::hours(1),
            ),
            resource_requirements: None,
            retry_policy: None,
            priority,
            timeout_ms: 1000,
            tlp_classification: TlpLevel::Clear,
            parent_contract_id: None,
            delegation_depth: 0,
            firebreak: None,
            reputation_requirements: None,
            status,
            created_at: now,
            activated_at: None,
            completed_at: None,
            verification_result: None,
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicates() {
        let store = InMemoryContractStore::new();
        let c = contract(ContractStatus::Pending, 5);
        store.insert(c.clone()).await.unwrap();
        assert!(store.insert(c).await.is_err());
    }

    #[tokio::test]
    async fn test_update_missing_contract_is_not_found() {
        let store = InMemoryContractStore::new();
        let c = contract(ContractStatus::Pending, 5);
        assert!(matches!(
            store.update(c).await,
            Err(WardenError::NotFound { .. }),
        ));
    }

    #[tokio::test]
    async fn test_query_filters_by_status_set() {
        let store = InMemoryContractStore::new();
        store
            .insert(contract(ContractStatus::Pending, 5))
            .await
            .unwrap();
        store
            .insert(contract(ContractStatus::Active, 5))
            .await
            .unwrap();
        store
            .insert(contract(ContractStatus::Completed, 5))
            .await
            .unwrap();

        let filter = ContractFilter::default()
            .with_statuses(vec![ContractStatus::Pending, ContractStatus::Active]);
        let results = store.query(&filter).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_query_sort_and_pagination() {
        let store = InMemoryContractStore::new();
        for priority in [3, 9, 1, 7] {
            store
                .insert(contract(ContractStatus::Pending, priority))
                .await
                .unwrap();
        }

        let filter = ContractFilter {
            sort_by: Some(crate::filter::SortBy::Priority),
            sort_order: Some(crate::filter::SortOrder::Desc),
            limit: Some(2),
            offset: Some(1),
            ..Default::default()
        };
        let results = store.query(&filter).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].priority, 7);
        assert_eq!(results[1].priority, 3);
    }

    #[tokio::test]
    async fn test_audit_log_chains_and_verifies() {
        let log = InMemoryAuditLog::new();
        for i in 0..5 {
            let event = AuditEvent::new(
                AuditEventKind::DelegationCreated,
                Uuid::new_v4(),
                format!("agent-{i}"),
                serde_json::json!({"i": i}),
                "test",
            );
            log.append(event).await.unwrap();
        }
        assert!(log.verify_integrity().await.unwrap());
        assert!(log.latest_hash().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_audit_log_concurrent_writers_keep_chain() {
        let log = Arc::new(InMemoryAuditLog::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                for j in 0..10 {
                    let event = AuditEvent::new(
                        AuditEventKind::ReputationUpdated,
                        Uuid::new_v4(),
                        format!("writer-{i}"),
                        serde_json::json!({"j": j}),
                        "test",
                    );
                    log.append(event).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(log.verify_integrity().await.unwrap());
        let all = log.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(all.len(), 80);
    }

    #[tokio::test]
    async fn test_audit_query_filters() {
        let log = InMemoryAuditLog::new();
        let agent = Uuid::new_v4();
        let contract_id = Uuid::new_v4();
        log.append(
            AuditEvent::new(
                AuditEventKind::DelegationCreated,
                agent,
                "a",
                serde_json::json!({}),
                "test",
            )
            .with_contract(contract_id),
        )
        .await
        .unwrap();
        log.append(AuditEvent::new(
            AuditEventKind::ClearanceDecision,
            Uuid::new_v4(),
            "b",
            serde_json::json!({}),
            "test",
        ))
        .await
        .unwrap();

        let by_agent = log
            .query(&AuditQuery {
                agent_id: Some(agent),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_agent.len(), 1);

        let by_contract = log
            .query(&AuditQuery {
                contract_id: Some(contract_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_contract.len(), 1);
        assert_eq!(
            by_contract[0].event_type,
            AuditEventKind::DelegationCreated,
        );
    }
}
