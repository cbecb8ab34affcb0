use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_store::ContractStore;
use warden_types::{DelegationContract, Result, WardenError};

/// Result of analyzing a delegation chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainAnalysis {
    /// Number of contracts in the chain, root included.
    pub depth: u32,
    /// Contract ids, root first.
    pub contract_ids: Vec<Uuid>,
    pub has_loops: bool,
    /// Each detected loop as the repeating agent subsequence.
    pub loops: Vec<Vec<Uuid>>,
    /// Contracts in the chain carrying their own firebreak limits.
    pub firebreak_contracts: Vec<Uuid>,
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Reconstructs and bounds delegation lineage from `parent_contract_id`
/// links in the contract store.
#[derive(Clone)]
pub struct ChainTracker {
    store: Arc<dyn ContractStore>,
    max_chain_depth: u32,
}

impl ChainTracker {
    pub fn new(store: Arc<dyn ContractStore>, max_chain_depth: u32) -> Self {
        Self {
            store,
            max_chain_depth,
        }
    }

    /// Walk `parent_contract_id` upward to the root. Returns the chain
    /// root-first, ending at the requested contract.
    pub async fn build_chain(&self, contract_id: Uuid) -> Result<Vec<DelegationContract>> {
        let mut chain = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::new();
        let mut cursor = Some(contract_id);

        while let Some(id) = cursor {
            // A parent cycle would walk forever; the seen-set bounds it.
            if !seen.insert(id) {
                break;
            }
            let contract = self
                .store
                .get(id)
                .await?
                .ok_or_else(|| WardenError::not_found("contract", id))?;
            cursor = contract.parent_contract_id;
            chain.push(contract);
        }

        chain.reverse();
        Ok(chain)
    }

    /// Analyze the chain ending at `contract_id`.
    pub async fn analyze_chain(&self, contract_id: Uuid) -> Result<ChainAnalysis> {
        let chain = self.build_chain(contract_id).await?;
        Ok(self.analyze(&chain, None))
    }

    /// Analyze the chain a new delegation would create: the existing chain
    /// ending at `parent_contract_id` plus the candidate delegatee.
    pub async fn analyze_candidate(
        &self,
        parent_contract_id: Uuid,
        candidate_delegatee: Uuid,
    ) -> Result<ChainAnalysis> {
        let chain = self.build_chain(parent_contract_id).await?;
        Ok(self.analyze(&chain, Some(candidate_delegatee)))
    }

    fn analyze(&self, chain: &[DelegationContract], candidate: Option<Uuid>) -> ChainAnalysis {
        let contract_ids: Vec<Uuid> = chain.iter().map(|c| c.contract_id).collect();
        let firebreak_contracts: Vec<Uuid> = chain
            .iter()
            .filter(|c| c.firebreak.is_some())
            .map(|c| c.contract_id)
            .collect();

        // The agent sequence along the chain: the root delegator, then each
        // contract's delegatee, then the candidate under test.
        let mut agents: Vec<Uuid> = Vec::with_capacity(chain.len() + 2);
        if let Some(root) = chain.first() {
            agents.push(root.delegator.id);
        }
        agents.extend(chain.iter().map(|c| c.delegatee.id));
        if let Some(candidate) = candidate {
            agents.push(candidate);
        }

        let loops = find_loops(&agents);
        let has_loops = !loops.is_empty();

        let depth = chain.len() as u32 + u32::from(candidate.is_some());
        let mut errors = Vec::new();
        if depth > self.max_chain_depth {
            errors.push(format!(
                "chain depth {depth} exceeds max depth {}",
                self.max_chain_depth,
            ));
        }
        if has_loops {
            errors.push(format!(
                "delegation loop detected among {} agents",
                loops[0].len(),
            ));
        }

        ChainAnalysis {
            depth,
            contract_ids,
            has_loops,
            loops,
            firebreak_contracts,
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// A loop exists iff any agent appears more than once in the sequence.
/// Each loop is reported as the subsequence from the first occurrence
/// through the repeat, inclusive.
fn find_loops(agents: &[Uuid]) -> Vec<Vec<Uuid>> {
    let mut loops = Vec::new();
    let mut reported: HashSet<Uuid> = HashSet::new();
    for (later_idx, agent) in agents.iter().enumerate() {
        if reported.contains(agent) {
            continue;
        }
        if let Some(first_idx) = agents[..later_idx].iter().position(|a| a == agent) {
            loops.push(agents[first_idx..=later_idx].to_vec());
            reported.insert(*agent);
        }
    }
    loops
}
