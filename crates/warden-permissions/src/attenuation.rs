use uuid::Uuid;

use warden_types::{PermissionToken, Result, WardenError, scope_covers};

use crate::glob::pattern_subsumes;

/// Derive a strictly-narrower child token from `parent` and the requested
/// `child` token.
///
/// Guarantees on the returned token:
/// - every scope is covered by a parent scope (dotted prefix inclusion),
/// - every action appears in the parent's action set,
/// - resources are the glob intersection of both sets, with `!`-negations
///   from either side preserved,
/// - `expires_at` never exceeds the parent's,
/// - `delegation_depth` is exactly `parent.delegation_depth + 1`,
/// - each named numeric constraint is the minimum of both sides.
///
/// A scope or action outside the parent's authority is a violation, not a
/// silent trim; widening is never implicit.
pub fn attenuate(parent: &PermissionToken, child: &PermissionToken) -> Result<PermissionToken> {
    let rogue_scopes: Vec<&String> = child
        .scopes
        .iter()
        .filter(|scope| !parent.scopes.iter().any(|held| scope_covers(held, scope)))
        .collect();
    if !rogue_scopes.is_empty() {
        return Err(WardenError::PermissionAttenuationViolation {
            reason: format!(
                "child scopes not covered by parent: {}",
                rogue_scopes
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        });
    }

    let rogue_actions: Vec<&String> = child
        .actions
        .iter()
        .filter(|action| !parent.actions.contains(action))
        .collect();
    if !rogue_actions.is_empty() {
        return Err(WardenError::PermissionAttenuationViolation {
            reason: format!(
                "child actions not granted by parent: {}",
                rogue_actions
                    .iter()
                    .map(|a| a.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
        });
    }

    let resources = intersect_resources(&parent.resources, &child.resources);

    let mut constraints = child.constraints.clone();
    for (key, parent_value) in &parent.constraints {
        constraints
            .entry(key.clone())
            .and_modify(|v| *v = v.min(*parent_value))
            .or_insert(*parent_value);
    }

    Ok(PermissionToken {
        token_id: Uuid::new_v4(),
        scopes: child.scopes.clone(),
        actions: child.actions.clone(),
        resources,
        issued_at: chrono::Utc::now(),
        expires_at: child.expires_at.min(parent.expires_at),
        delegation_depth: parent.delegation_depth + 1,
        constraints,
    })
}

/// Glob intersection of resource lists. Positive child patterns survive
/// only when subsumed by some positive parent pattern; `!`-exclusions from
/// both sides are carried into the child so a parent exclusion can never
/// be escaped.
fn intersect_resources(parent: &[String], child: &[String]) -> Vec<String> {
    let parent_positive: Vec<&str> = parent
        .iter()
        .filter(|r| !r.starts_with('!'))
        .map(|r| r.as_str())
        .collect();

    let mut resources: Vec<String> = child
        .iter()
        .filter(|r| !r.starts_with('!'))
        .filter(|r| {
            parent_positive
                .iter()
                .any(|held| pattern_subsumes(held, r))
        })
        .cloned()
        .collect();

    for negation in child.iter().filter(|r| r.starts_with('!')) {
        if !resources.contains(negation) {
            resources.push(negation.clone());
        }
    }
    for negation in parent.iter().filter(|r| r.starts_with('!')) {
        if !resources.contains(negation) {
            resources.push(negation.clone());
        }
    }
    resources
}

/// Post-hoc check used by tests and the admission pipeline: is `child`
/// within `parent`'s authority?
pub fn is_attenuation_of(parent: &PermissionToken, child: &PermissionToken) -> bool {
    child
        .scopes
        .iter()
        .all(|scope| parent.scopes.iter().any(|held| scope_covers(held, scope)))
        && child.actions.iter().all(|a| parent.actions.contains(a))
        && child.expires_at <= parent.expires_at
        && child.delegation_depth == parent.delegation_depth + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn token(scopes: &[&str], actions: &[&str], resources: &[&str]) -> PermissionToken {
        PermissionToken::new(
            scopes.iter().map(|s| s.to_string()).collect(),
            actions.iter().map(|s| s.to_string()).collect(),
            resources.iter().map(|s| s.to_string()).collect(),
            Utc::now() + Duration::hours(2),
        )
    }

    #[test]
    fn test_attenuate_basic() {
        let parent = token(&["fs", "net"], &["read", "write"], &["data/*"]);
        let child = token(&["fs.read"], &["read"], &["data/reports/*"]);

        let result = attenuate(&parent, &child).unwrap();
        assert_eq!(result.scopes, vec!["fs.read".to_string()]);
        assert_eq!(result.actions, vec!["read".to_string()]);
        assert_eq!(result.resources, vec!["data/reports/*".to_string()]);
        assert_eq!(result.delegation_depth, parent.delegation_depth + 1);
        assert!(result.expires_at <= parent.expires_at);
    }

    #[test]
    fn test_attenuate_rejects_wider_scope() {
        let parent = token(&["fs.read"], &["read"], &["*"]);
        let child = token(&["fs"], &["read"], &["*"]);
        let err = attenuate(&parent, &child).unwrap_err();
        assert!(matches!(
            err,
            WardenError::PermissionAttenuationViolation { .. },
        ));
    }

    #[test]
    fn test_attenuate_rejects_extra_action() {
        // Parent grants read only; child asks for read and write.
        let parent = token(&["fs"], &["read"], &["*"]);
        let child = token(&["fs"], &["read", "write"], &["*"]);
        let err = attenuate(&parent, &child).unwrap_err();
        match err {
            WardenError::PermissionAttenuationViolation { reason } => {
                assert!(reason.contains("write"));
            }
            other => panic!("expected attenuation violation, got {other:?}"),
        }
    }

    #[test]
    fn test_attenuate_caps_expiry() {
        let parent = token(&["fs"], &["read"], &["*"]);
        let mut child = token(&["fs"], &["read"], &["*"]);
        child.expires_at = parent.expires_at + Duration::hours(5);
        let result = attenuate(&parent, &child).unwrap();
        assert_eq!(result.expires_at, parent.expires_at);
    }

    #[test]
    fn test_attenuate_preserves_negations() {
        let parent = token(&["fs"], &["read"], &["data/*", "!data/secrets/*"]);
        let child = token(&["fs"], &["read"], &["data/reports/*"]);
        let result = attenuate(&parent, &child).unwrap();
        assert!(result.resources.contains(&"data/reports/*".to_string()));
        assert!(result.resources.contains(&"!data/secrets/*".to_string()));
    }

    #[test]
    fn test_attenuate_drops_uncovered_resources() {
        let parent = token(&["fs"], &["read"], &["data/*"]);
        let child = token(&["fs"], &["read"], &["data/a.json", "logs/*"]);
        let result = attenuate(&parent, &child).unwrap();
        assert_eq!(result.resources, vec!["data/a.json".to_string()]);
    }

    #[test]
    fn test_attenuate_merges_constraints_by_min() {
        let mut parent = token(&["fs"], &["read"], &["*"]);
        parent.constraints.insert("max_cost".into(), 1000.0);
        parent.constraints.insert("rate_per_min".into(), 60.0);
        let mut child = token(&["fs"], &["read"], &["*"]);
        child.constraints.insert("max_cost".into(), 2500.0);

        let result = attenuate(&parent, &child).unwrap();
        assert_eq!(result.constraints["max_cost"], 1000.0);
        assert_eq!(result.constraints["rate_per_min"], 60.0);
    }

    #[test]
    fn test_attenuate_chained() {
        let parent = token(&["fs"], &["read", "write"], &["data/*"]);
        let child1 = attenuate(&parent, &token(&["fs.read"], &["read"], &["data/*"])).unwrap();
        assert_eq!(child1.delegation_depth, 1);
        let child2 =
            attenuate(&child1, &token(&["fs.read.tmp"], &["read"], &["data/tmp/*"])).unwrap();
        assert_eq!(child2.delegation_depth, 2);
        assert!(is_attenuation_of(&child1, &child2));
        assert!(child2.expires_at <= parent.expires_at);
    }

    #[test]
    fn test_depth_is_parent_plus_one() {
        let mut parent = token(&["fs"], &["read"], &["*"]);
        parent.delegation_depth = 3;
        let mut child = token(&["fs"], &["read"], &["*"]);
        child.delegation_depth = 99; // Requested depth is ignored.
        let result = attenuate(&parent, &child).unwrap();
        assert_eq!(result.delegation_depth, 4);
    }
}
