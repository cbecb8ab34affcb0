use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::Instant;
use uuid::Uuid;

use warden_classification::ClassificationEnforcer;
use warden_firebreak::{FirebreakContext, FirebreakEnforcer};
use warden_permissions::attenuate;
use warden_registry::{CapabilityQuery, CapabilityRegistry};
use warden_reputation::ReputationEngine;
use warden_security::{SecurityValidator, ValidationContext};
use warden_store::{
    AuditLog, BackoffPolicy, ContractFilter, ContractStore, with_backoff,
};
use warden_types::{
    AgentRef, AuditEvent, AuditEventKind, ContractStatus, DelegationContract,
    DelegationRequest, PermissionToken, Result, WardenError,
};

use warden_events::{ControlPlaneEvent, EventBus};

use crate::chain::ChainTracker;
use crate::deadline::{DeadlineEntry, DeadlineHandler, DeadlineQueue};

const SOURCE_SYSTEM: &str = "contract_manager";

fn default_max_delegation_depth() -> u32 {
    5
}

fn default_max_chain_depth() -> u32 {
    5
}

fn default_token_ttl_ms() -> u64 {
    3_600_000
}

/// Contract-manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContractManagerConfig {
    /// Contracts at this delegation depth or deeper are rejected.
    #[serde(default = "default_max_delegation_depth")]
    pub max_delegation_depth: u32,
    /// Chain-length bound applied by the chain tracker.
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: u32,
    /// Lifetime of the default root token when a request carries none.
    #[serde(default = "default_token_ttl_ms")]
    pub default_token_ttl_ms: u64,
}

impl Default for ContractManagerConfig {
    fn default() -> Self {
        Self {
            max_delegation_depth: default_max_delegation_depth(),
            max_chain_depth: default_max_chain_depth(),
            default_token_ttl_ms: default_token_ttl_ms(),
        }
    }
}

/// Optional extras carried on a status update.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Per-status counts plus the derived success rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractStatistics {
    pub total: usize,
    pub by_status: HashMap<String, usize>,
    /// completed / (completed + failed + timeout); 0 when undefined.
    pub success_rate: f64,
}

/// CRUD plus the lifecycle state machine for delegation contracts, with
/// the four admission gates in front.
pub struct ContractManager {
    store: Arc<dyn ContractStore>,
    audit: Arc<dyn AuditLog>,
    registry: Arc<CapabilityRegistry>,
    classification: Arc<ClassificationEnforcer>,
    security: Arc<SecurityValidator>,
    reputation: Arc<ReputationEngine>,
    firebreak: Arc<FirebreakEnforcer>,
    chain: ChainTracker,
    events: EventBus,
    config: ContractManagerConfig,
    backoff: BackoffPolicy,
    /// Serializes status transitions per contract.
    transition_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    deadline_tx: mpsc::Sender<DeadlineEntry>,
    deadline_rx: std::sync::Mutex<Option<mpsc::Receiver<DeadlineEntry>>>,
}

impl ContractManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ContractStore>,
        audit: Arc<dyn AuditLog>,
        registry: Arc<CapabilityRegistry>,
        classification: Arc<ClassificationEnforcer>,
        security: Arc<SecurityValidator>,
        reputation: Arc<ReputationEngine>,
        firebreak: Arc<FirebreakEnforcer>,
        config: ContractManagerConfig,
    ) -> Self {
        let chain = ChainTracker::new(store.clone(), config.max_chain_depth);
        let (deadline_tx, deadline_rx) = mpsc::channel(256);
        Self {
            store,
            audit,
            registry,
            classification,
            security,
            reputation,
            firebreak,
            chain,
            events: EventBus::default(),
            config,
            backoff: BackoffPolicy::default(),
            transition_locks: DashMap::new(),
            deadline_tx,
            deadline_rx: std::sync::Mutex::new(Some(deadline_rx)),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn chain_tracker(&self) -> &ChainTracker {
        &self.chain
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn reputation(&self) -> &Arc<ReputationEngine> {
        &self.reputation
    }

    pub fn security(&self) -> &Arc<SecurityValidator> {
        &self.security
    }

    pub fn classification(&self) -> &Arc<ClassificationEnforcer> {
        &self.classification
    }

    /// Spawn the timeout monitor. Returns the shutdown handle; signalling
    /// `true` stops the queue. May be called once.
    pub fn start_timeout_monitor(self: Arc<Self>) -> watch::Sender<bool> {
        let receiver = self
            .deadline_rx
            .lock()
            .expect("deadline receiver mutex poisoned")
            .take()
            .expect("timeout monitor already started");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let queue = DeadlineQueue::new(self, receiver, shutdown_rx);
        tokio::spawn(queue.run());
        shutdown_tx
    }

    /// Admit and persist a new contract. Gate order: capability binding,
    /// classification, security, reputation, firebreak; the first rejection
    /// wins and nothing is persisted.
    pub async fn create_contract(
        &self,
        request: DelegationRequest,
    ) -> Result<DelegationContract> {
        request.validate()?;

        let delegatee = self.bind_delegatee(&request)?;
        let manifest = self.registry.get_manifest(delegatee.id);

        let parent = match request.parent_contract_id {
            Some(parent_id) => Some(
                self.store
                    .get(parent_id)
                    .await?
                    .ok_or_else(|| WardenError::not_found("parent contract", parent_id))?,
            ),
            None => None,
        };
        let depth = parent
            .as_ref()
            .map(|p| p.delegation_depth + 1)
            .unwrap_or(0);

        if depth >= self.config.max_delegation_depth {
            let err = WardenError::MaxDepthExceeded {
                depth,
                max: self.config.max_delegation_depth,
            };
            self.audit_block("depth", &err, &request.delegator, &delegatee)
                .await;
            return Err(err);
        }

        let mut chain_agents: Vec<Uuid> = vec![request.delegator.id];
        if let Some(parent) = &parent {
            let analysis = self
                .chain
                .analyze_candidate(parent.contract_id, delegatee.id)
                .await?;
            if analysis.has_loops {
                let err = WardenError::LoopDetected {
                    cycle: analysis.loops[0].clone(),
                };
                self.audit_block("chain", &err, &request.delegator, &delegatee)
                    .await;
                return Err(err);
            }
            if !analysis.valid {
                let err = WardenError::MaxDepthExceeded {
                    depth: analysis.depth,
                    max: self.config.max_chain_depth,
                };
                self.audit_block("chain", &err, &request.delegator, &delegatee)
                    .await;
                return Err(err);
            }
            let parent_chain = self.chain.build_chain(parent.contract_id).await?;
            chain_agents = parent_chain
                .first()
                .map(|root| vec![root.delegator.id])
                .unwrap_or_default();
            chain_agents.extend(parent_chain.iter().map(|c| c.delegatee.id));
        }

        let token = match self.derive_token(&request, parent.as_ref()) {
            Ok(token) => token,
            Err(err) => {
                self.audit_block("attenuation", &err, &request.delegator, &delegatee)
                    .await;
                return Err(err);
            }
        };

        // Gate 1: classification.
        let clearance = manifest.as_ref().and_then(|m| m.max_clearance());
        if let Err(err) = self
            .classification
            .enforce(
                delegatee.id,
                &delegatee.name,
                clearance,
                request.tlp_classification,
                None,
            )
            .await
        {
            self.audit_block("classification", &err, &request.delegator, &delegatee)
                .await;
            return Err(err);
        }

        // Gate 2: security.
        let verdict = self
            .security
            .validate(&self.security_context(&request, &delegatee, manifest.as_ref(), &token, depth, parent.as_ref()))
            .await;
        if !verdict.findings.is_empty() {
            // Recorded even when non-blocking.
            self.append_audit(
                AuditEvent::new(
                    AuditEventKind::SecurityThreatDetected,
                    delegatee.id,
                    &delegatee.name,
                    serde_json::json!({
                        "action": verdict.action.as_str(),
                        "worst_severity": verdict.worst_severity.map(|s| s.as_str()),
                        "findings": verdict.findings,
                    }),
                    SOURCE_SYSTEM,
                ),
            )
            .await;
            self.events.publish(ControlPlaneEvent::SecurityThreatDetected {
                delegator_id: request.delegator.id,
                delegatee_id: delegatee.id,
                blocked: verdict.is_blocked(),
                worst_severity: verdict.worst_severity,
                findings: verdict.findings.clone(),
            });
        }
        if verdict.is_blocked() {
            if let Err(err) = self
                .reputation
                .record_security_block(delegatee.id, &delegatee.name, Uuid::nil())
                .await
            {
                tracing::warn!(error = %err, "failed to record security block observation");
            }
            let worst = verdict
                .findings
                .iter()
                .max_by_key(|f| f.severity)
                .expect("blocked verdict has findings");
            return Err(WardenError::SecurityThreat {
                threat_type: worst.threat_type.as_str().to_string(),
                severity: worst.severity,
            });
        }

        // Gate 3: reputation.
        if let Some(requirements) = &request.reputation_requirements {
            if let Err(err) = self.reputation.check_requirements(delegatee.id, requirements) {
                self.audit_block("reputation", &err, &request.delegator, &delegatee)
                    .await;
                return Err(err);
            }
        }

        // Gate 4: firebreak. Depth here is 1-based chain length.
        let firebreak_ctx = FirebreakContext {
            delegation_depth: depth + 1,
            estimated_value: request.estimated_value.unwrap_or(0.0),
            involves_critical_systems: request.involves_critical_systems,
            is_external_delegation: request.is_external_delegation,
            chain_agents,
        };
        let firebreak_result = self
            .firebreak
            .evaluate_with_limits(&firebreak_ctx, request.firebreak.as_ref());
        if !firebreak_result.firebreaks_passed {
            let err = WardenError::FirebreakBlocked {
                blocking: firebreak_result.blocking_firebreaks.clone(),
            };
            self.audit_block("firebreak", &err, &request.delegator, &delegatee)
                .await;
            return Err(err);
        }

        // Delegatee must have headroom before admission.
        if let Some(manifest) = &manifest {
            if !manifest.has_spare_capacity() {
                return Err(WardenError::invalid(format!(
                    "delegatee {} is at max concurrent tasks",
                    delegatee.name,
                )));
            }
        }

        let contract = DelegationContract {
            contract_id: Uuid::new_v4(),
            task_id: request.task_id.clone(),
            task_description: request.task_description.clone(),
            delegator: request.delegator.clone(),
            delegatee: delegatee.clone(),
            required_capabilities: request.required_capabilities.clone(),
            verification_policy: request.verification_policy,
            success_criteria: request.success_criteria.clone(),
            permission_token: token,
            resource_requirements: request.resource_requirements.clone(),
            retry_policy: request.retry_policy.clone(),
            priority: request.priority,
            timeout_ms: request.timeout_ms,
            tlp_classification: request.tlp_classification,
            parent_contract_id: request.parent_contract_id,
            delegation_depth: depth,
            firebreak: request.firebreak.clone(),
            reputation_requirements: request.reputation_requirements.clone(),
            status: ContractStatus::Pending,
            created_at: Utc::now(),
            activated_at: None,
            completed_at: None,
            verification_result: None,
            metadata: request.metadata.clone(),
        };

        with_backoff(self.backoff, || self.store.insert(contract.clone())).await?;
        if manifest.is_some() {
            if let Err(err) = self.registry.increment_workload(delegatee.id) {
                tracing::warn!(error = %err, "workload increment failed after admission");
            }
        }

        self.append_audit(
            AuditEvent::new(
                AuditEventKind::DelegationCreated,
                delegatee.id,
                &delegatee.name,
                serde_json::json!({
                    "task_id": contract.task_id,
                    "delegator": contract.delegator,
                    "delegation_depth": contract.delegation_depth,
                    "tlp_classification": contract.tlp_classification,
                }),
                SOURCE_SYSTEM,
            )
            .with_contract(contract.contract_id),
        )
        .await;
        self.events.publish(ControlPlaneEvent::ContractCreated {
            contract_id: contract.contract_id,
            task_id: contract.task_id.clone(),
            delegator_id: contract.delegator.id,
            delegatee_id: contract.delegatee.id,
            delegation_depth: contract.delegation_depth,
        });
        tracing::info!(contract_id = %contract.contract_id, task_id = %contract.task_id,
            depth = contract.delegation_depth, "contract admitted");

        Ok(contract)
    }

    pub async fn get_contract(&self, contract_id: Uuid) -> Result<DelegationContract> {
        self.store
            .get(contract_id)
            .await?
            .ok_or_else(|| WardenError::not_found("contract", contract_id))
    }

    pub async fn query_contracts(
        &self,
        filter: &ContractFilter,
    ) -> Result<Vec<DelegationContract>> {
        self.store.query(filter).await
    }

    /// Apply a status transition. Transitions for one contract are
    /// serialized; the state machine decides legality and timestamps.
    pub async fn update_contract_status(
        &self,
        contract_id: Uuid,
        new_status: ContractStatus,
        extras: Option<StatusUpdate>,
    ) -> Result<DelegationContract> {
        let lock = self
            .transition_locks
            .entry(contract_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let mut contract = self.get_contract(contract_id).await?;
        let old_status = contract.status;
        contract.apply_transition(new_status, Utc::now())?;
        if let Some(extras) = &extras {
            if let Some(result) = &extras.verification_result {
                contract.verification_result = Some(result.clone());
            }
        }

        with_backoff(self.backoff, || self.store.update(contract.clone())).await?;
        self.after_transition(&contract, old_status, extras.as_ref())
            .await;
        Ok(contract)
    }

    /// Cancel from `pending` or `active`; a no-op when already terminal.
    pub async fn cancel_contract(
        &self,
        contract_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<DelegationContract> {
        self.terminate(contract_id, ContractStatus::Cancelled, reason.into())
            .await
    }

    /// Soft delete: the contract is revoked, never removed from storage.
    pub async fn delete_contract(
        &self,
        contract_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<DelegationContract> {
        self.terminate(contract_id, ContractStatus::Revoked, reason.into())
            .await
    }

    pub async fn get_active_contracts(&self, agent_id: Uuid) -> Result<Vec<DelegationContract>> {
        let filter = ContractFilter {
            delegatee_id: Some(agent_id),
            ..Default::default()
        }
        .with_statuses(vec![ContractStatus::Pending, ContractStatus::Active]);
        self.store.query(&filter).await
    }

    pub async fn get_statistics(&self, agent_id: Option<Uuid>) -> Result<ContractStatistics> {
        let filter = ContractFilter {
            delegatee_id: agent_id,
            ..Default::default()
        };
        let contracts = self.store.query(&filter).await?;

        let mut by_status: HashMap<String, usize> = HashMap::new();
        for contract in &contracts {
            *by_status
                .entry(contract.status.as_str().to_string())
                .or_default() += 1;
        }
        let completed = *by_status.get("completed").unwrap_or(&0);
        let failed = *by_status.get("failed").unwrap_or(&0);
        let timed_out = *by_status.get("timeout").unwrap_or(&0);
        let finished = completed + failed + timed_out;
        Ok(ContractStatistics {
            total: contracts.len(),
            by_status,
            success_rate: if finished == 0 {
                0.0
            } else {
                completed as f64 / finished as f64
            },
        })
    }

    fn bind_delegatee(&self, request: &DelegationRequest) -> Result<AgentRef> {
        if let Some(delegatee) = &request.delegatee {
            return Ok(delegatee.clone());
        }
        let query = CapabilityQuery {
            required_categories: request.required_capabilities.clone(),
            required_tlp_clearance: Some(request.tlp_classification),
            only_available: true,
            exclude_agents: vec![request.delegator.id],
            ..Default::default()
        };
        let matches = self.registry.match_agents(&query);
        let best = matches.first().ok_or_else(|| {
            WardenError::invalid(format!(
                "no available agent matches required capabilities {:?}",
                request.required_capabilities,
            ))
        })?;
        Ok(AgentRef::new(best.agent_id, best.agent_name.clone()))
    }

    /// The child token: attenuated from the parent when one exists,
    /// otherwise the requested (or a default) root token.
    fn derive_token(
        &self,
        request: &DelegationRequest,
        parent: Option<&DelegationContract>,
    ) -> Result<PermissionToken> {
        match (parent, &request.permission_token) {
            (Some(parent), Some(requested)) => {
                attenuate(&parent.permission_token, requested)
            }
            (Some(parent), None) => {
                // No narrower ask: inherit the parent's authority one level down.
                attenuate(&parent.permission_token, &parent.permission_token)
            }
            (None, Some(requested)) => {
                let mut token = requested.clone();
                token.delegation_depth = 0;
                Ok(token)
            }
            (None, None) => Ok(PermissionToken::new(
                vec!["delegation".to_string()],
                vec!["run".to_string()],
                vec!["*".to_string()],
                Utc::now() + chrono::Duration::milliseconds(self.config.default_token_ttl_ms as i64),
            )),
        }
    }

    fn security_context(
        &self,
        request: &DelegationRequest,
        delegatee: &AgentRef,
        manifest: Option<&warden_types::AgentCapabilityManifest>,
        token: &PermissionToken,
        depth: u32,
        parent: Option<&DelegationContract>,
    ) -> ValidationContext {
        let mut ctx = ValidationContext::new(request.delegator.clone(), delegatee.clone());
        ctx.scopes = token.scopes.clone();
        ctx.actions = token.actions.clone();
        // The detector sees the depth the requester declared on its token,
        // which may overstate the computed depth.
        ctx.delegation_depth = request
            .permission_token
            .as_ref()
            .map(|t| t.delegation_depth)
            .unwrap_or(depth)
            .max(depth);
        ctx.child_tlp = request.tlp_classification;
        ctx.parent_tlp = parent.map(|p| p.tlp_classification);
        ctx.tlp_justification = request
            .metadata
            .get("tlp_justification")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        ctx.resource_requirements = request.resource_requirements.clone();
        ctx.estimated_duration_ms = request.timeout_ms;
        if let Some(manifest) = manifest {
            ctx.delegatee_total_completions = manifest.total_completions;
            ctx.delegatee_success_rate = manifest
                .capabilities
                .iter()
                .filter_map(|c| c.success_rate)
                .reduce(f64::max);
        }
        ctx
    }

    async fn terminate(
        &self,
        contract_id: Uuid,
        status: ContractStatus,
        reason: String,
    ) -> Result<DelegationContract> {
        let lock = self
            .transition_locks
            .entry(contract_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let mut contract = self.get_contract(contract_id).await?;
        if contract.status.is_terminal() {
            return Ok(contract);
        }
        let old_status = contract.status;
        contract.apply_transition(status, Utc::now())?;
        with_backoff(self.backoff, || self.store.update(contract.clone())).await?;

        self.append_audit(
            AuditEvent::new(
                AuditEventKind::ContractCancelled,
                contract.delegatee.id,
                &contract.delegatee.name,
                serde_json::json!({
                    "old_status": old_status.as_str(),
                    "new_status": status.as_str(),
                    "reason": reason,
                }),
                SOURCE_SYSTEM,
            )
            .with_contract(contract.contract_id),
        )
        .await;
        self.events.publish(ControlPlaneEvent::ContractCancelled {
            contract_id,
            reason,
        });
        let _ = self.registry.decrement_workload(contract.delegatee.id);
        Ok(contract)
    }

    async fn after_transition(
        &self,
        contract: &DelegationContract,
        old_status: ContractStatus,
        extras: Option<&StatusUpdate>,
    ) {
        self.append_audit(
            AuditEvent::new(
                AuditEventKind::DelegationVerified,
                contract.delegatee.id,
                &contract.delegatee.name,
                serde_json::json!({
                    "old_status": old_status.as_str(),
                    "new_status": contract.status.as_str(),
                    "reason": extras.and_then(|e| e.reason.clone()),
                }),
                SOURCE_SYSTEM,
            )
            .with_contract(contract.contract_id),
        )
        .await;
        self.events.publish(ControlPlaneEvent::ContractStatusChanged {
            contract_id: contract.contract_id,
            old_status,
            new_status: contract.status,
        });

        match contract.status {
            ContractStatus::Active => {
                let entry = DeadlineEntry {
                    contract_id: contract.contract_id,
                    deadline: Instant::now() + Duration::from_millis(contract.timeout_ms),
                };
                if let Err(err) = self.deadline_tx.send(entry).await {
                    tracing::warn!(error = %err, "deadline queue unavailable");
                }
            }
            ContractStatus::Completed => {
                let actual_ms = match (contract.activated_at, contract.completed_at) {
                    (Some(started), Some(finished)) => (finished - started)
                        .num_milliseconds()
                        .max(0) as u64,
                    _ => contract.timeout_ms,
                };
                if let Err(err) = self
                    .reputation
                    .record_success(
                        contract.delegatee.id,
                        &contract.delegatee.name,
                        contract.contract_id,
                        contract.timeout_ms,
                        actual_ms,
                    )
                    .await
                {
                    tracing::warn!(error = %err, "reputation update failed");
                }
                let _ = self
                    .registry
                    .record_completion(contract.delegatee.id, actual_ms);
                let _ = self.registry.decrement_workload(contract.delegatee.id);
            }
            ContractStatus::Failed | ContractStatus::Timeout => {
                if let Err(err) = self
                    .reputation
                    .record_failure(
                        contract.delegatee.id,
                        &contract.delegatee.name,
                        contract.contract_id,
                    )
                    .await
                {
                    tracing::warn!(error = %err, "reputation update failed");
                }
                let _ = self.registry.decrement_workload(contract.delegatee.id);
            }
            ContractStatus::Cancelled | ContractStatus::Revoked => {
                let _ = self.registry.decrement_workload(contract.delegatee.id);
            }
            ContractStatus::Pending => {}
        }
    }

    async fn audit_block(
        &self,
        gate: &str,
        err: &WardenError,
        delegator: &AgentRef,
        delegatee: &AgentRef,
    ) {
        self.append_audit(AuditEvent::new(
            AuditEventKind::AdmissionBlocked,
            delegatee.id,
            &delegatee.name,
            serde_json::json!({
                "gate": gate,
                "kind": err.kind(),
                "reason": err.to_string(),
                "remediation": err.remediation(),
                "delegator": delegator,
            }),
            SOURCE_SYSTEM,
        ))
        .await;
    }

    /// Audit is telemetry here: log and continue on failure.
    async fn append_audit(&self, event: AuditEvent) {
        if let Err(err) = self.audit.append(event).await {
            tracing::warn!(error = %err, "failed to append audit event");
        }
    }
}

#[async_trait]
impl DeadlineHandler for ContractManager {
    async fn on_deadline(&self, contract_id: Uuid) {
        let contract = match self.get_contract(contract_id).await {
            Ok(contract) => contract,
            Err(err) => {
                tracing::warn!(%contract_id, error = %err, "deadline fired for unknown contract");
                return;
            }
        };
        if contract.status != ContractStatus::Active {
            return;
        }
        if let Err(err) = self
            .update_contract_status(contract_id, ContractStatus::Timeout, None)
            .await
        {
            tracing::warn!(%contract_id, error = %err, "timeout transition failed");
        }
    }
}
