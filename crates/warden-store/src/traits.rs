use async_trait::async_trait;
use uuid::Uuid;

use warden_types::{AuditEvent, AuditEventKind, DelegationContract, Result};

use crate::filter::ContractFilter;

/// Durable home of delegation contracts. The contract store is the single
/// source of truth; reads are consistent with prior writes from the same
/// component.
#[async_trait]
pub trait ContractStore: Send + Sync {
    /// Persist a new contract. Fails if the contract id already exists.
    async fn insert(&self, contract: DelegationContract) -> Result<()>;

    async fn get(&self, contract_id: Uuid) -> Result<Option<DelegationContract>>;

    /// Replace the stored row for an existing contract.
    async fn update(&self, contract: DelegationContract) -> Result<()>;

    async fn query(&self, filter: &ContractFilter) -> Result<Vec<DelegationContract>>;
}

/// Filters for reading back audit history.
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub agent_id: Option<Uuid>,
    pub event_type: Option<AuditEventKind>,
    pub contract_id: Option<Uuid>,
    pub limit: Option<usize>,
}

/// Append-only, hash-chained audit log. Must tolerate concurrent writers
/// without loss; events for a contract are appended in transition order.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append an event, filling in `previous_hash` and `hash`, and return
    /// the sealed record.
    async fn append(&self, event: AuditEvent) -> Result<AuditEvent>;

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEvent>>;

    async fn latest_hash(&self) -> Result<Option<String>>;

    /// Walk the chain and verify every link. Returns `false` on the first
    /// broken hash.
    async fn verify_integrity(&self) -> Result<bool>;
}

/// SHA-256 over the event's canonical hash input.
pub fn seal_event(mut event: AuditEvent, previous_hash: Option<String>) -> AuditEvent {
    use sha2::{Digest, Sha256};
    event.previous_hash = previous_hash;
    let digest = Sha256::digest(event.hash_input().as_bytes());
    event.hash = format!("{digest:x}");
    event
}
