use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delegated authority carried by a contract.
///
/// Scopes are hierarchical dotted strings (`fs.read` is inside `fs`).
/// Resources are glob patterns; a leading `!` marks an exclusion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionToken {
    pub token_id: Uuid,
    pub scopes: Vec<String>,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub delegation_depth: u32,
    /// Named numeric limits (cost budgets, rate caps). Attenuation merges
    /// these by taking the minimum per key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constraints: BTreeMap<String, f64>,
}

impl PermissionToken {
    pub fn new(
        scopes: Vec<String>,
        actions: Vec<String>,
        resources: Vec<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id: Uuid::new_v4(),
            scopes,
            actions,
            resources,
            issued_at: Utc::now(),
            expires_at,
            delegation_depth: 0,
            constraints: BTreeMap::new(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether `scope` falls under any of this token's scopes by dotted
    /// prefix: a token holding `fs` covers `fs`, `fs.read`, `fs.read.tmp`.
    pub fn covers_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|held| scope_covers(held, scope))
    }

    pub fn covers_action(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }
}

/// Dotted-prefix inclusion between scopes.
pub fn scope_covers(parent: &str, child: &str) -> bool {
    child == parent
        || (child.len() > parent.len()
            && child.starts_with(parent)
            && child.as_bytes()[parent.len()] == b'.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn token(scopes: &[&str]) -> PermissionToken {
        PermissionToken::new(
            scopes.iter().map(|s| s.to_string()).collect(),
            vec!["read".into()],
            vec!["*".into()],
            Utc::now() + Duration::hours(1),
        )
    }

    #[test]
    fn test_scope_prefix_inclusion() {
        assert!(scope_covers("fs", "fs"));
        assert!(scope_covers("fs", "fs.read"));
        assert!(scope_covers("fs.read", "fs.read.tmp"));
        assert!(!scope_covers("fs", "fsx"));
        assert!(!scope_covers("fs.read", "fs"));
        assert!(!scope_covers("fs.read", "fs.write"));
    }

    #[test]
    fn test_covers_scope() {
        let t = token(&["fs", "net.http"]);
        assert!(t.covers_scope("fs.read"));
        assert!(t.covers_scope("net.http"));
        assert!(!t.covers_scope("net"));
        assert!(!t.covers_scope("proc"));
    }

    #[test]
    fn test_expiry() {
        let t = token(&["fs"]);
        assert!(!t.is_expired(Utc::now()));
        assert!(t.is_expired(Utc::now() + Duration::hours(2)));
    }
}
