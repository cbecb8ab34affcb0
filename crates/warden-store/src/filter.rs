use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_types::{ContractStatus, DelegationContract};

/// Accepts either a single status or a set on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusSelector {
    One(ContractStatus),
    Many(Vec<ContractStatus>),
}

impl StatusSelector {
    pub fn matches(&self, status: ContractStatus) -> bool {
        match self {
            StatusSelector::One(s) => *s == status,
            StatusSelector::Many(set) => set.contains(&status),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    CreatedAt,
    Priority,
    DelegationDepth,
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Query filter for `query_contracts`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegator_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegatee_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation_depth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_contract_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<SortOrder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl ContractFilter {
    pub fn with_status(mut self, status: ContractStatus) -> Self {
        self.status = Some(StatusSelector::One(status));
        self
    }

    pub fn with_statuses(mut self, statuses: Vec<ContractStatus>) -> Self {
        self.status = Some(StatusSelector::Many(statuses));
        self
    }

    fn matches(&self, c: &DelegationContract) -> bool {
        if let Some(selector) = &self.status {
            if !selector.matches(c.status) {
                return false;
            }
        }
        if let Some(id) = self.delegator_id {
            if c.delegator.id != id {
                return false;
            }
        }
        if let Some(id) = self.delegatee_id {
            if c.delegatee.id != id {
                return false;
            }
        }
        if let Some(task_id) = &self.task_id {
            if &c.task_id != task_id {
                return false;
            }
        }
        if let Some(depth) = self.delegation_depth {
            if c.delegation_depth != depth {
                return false;
            }
        }
        if let Some(parent) = self.parent_contract_id {
            if c.parent_contract_id != Some(parent) {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if c.priority != priority {
                return false;
            }
        }
        true
    }

    /// Apply filtering, sorting, and pagination in one place so every store
    /// backend behaves identically.
    pub fn apply(&self, contracts: impl IntoIterator<Item = DelegationContract>) -> Vec<DelegationContract> {
        let mut matched: Vec<DelegationContract> =
            contracts.into_iter().filter(|c| self.matches(c)).collect();

        let sort_by = self.sort_by.unwrap_or(SortBy::CreatedAt);
        matched.sort_by(|a, b| {
            let ordering = match sort_by {
                SortBy::CreatedAt => a.created_at.cmp(&b.created_at),
                SortBy::Priority => a.priority.cmp(&b.priority),
                SortBy::DelegationDepth => a.delegation_depth.cmp(&b.delegation_depth),
                SortBy::Status => a.status.as_str().cmp(b.status.as_str()),
            };
            // Stable tie-break so pagination is deterministic.
            ordering.then_with(|| a.contract_id.cmp(&b.contract_id))
        });
        if self.sort_order == Some(SortOrder::Desc) {
            matched.reverse();
        }

        let offset = self.offset.unwrap_or(0);
        let matched: Vec<DelegationContract> = matched.into_iter().skip(offset).collect();
        match self.limit {
            Some(limit) => matched.into_iter().take(limit).collect(),
            None => matched,
        }
    }
}
