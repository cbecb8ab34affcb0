use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_types::{AuthorityLevel, FirebreakLimits, LiabilityLevel};

fn default_supervisor_threshold() -> u32 {
    3
}

fn default_manager_threshold() -> u32 {
    5
}

fn default_executive_threshold() -> u32 {
    7
}

fn default_emergency_threshold() -> u32 {
    10
}

fn default_high_value_limit() -> f64 {
    50_000.0
}

fn default_trivial_value_limit() -> f64 {
    100.0
}

fn default_restrict_external() -> bool {
    true
}

fn default_emergency_contact() -> String {
    "oncall@warden.local".to_string()
}

/// Firebreak thresholds. All of these are configuration, not constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirebreakConfig {
    #[serde(default = "default_supervisor_threshold")]
    pub supervisor_threshold: u32,
    #[serde(default = "default_manager_threshold")]
    pub manager_threshold: u32,
    #[serde(default = "default_executive_threshold")]
    pub executive_threshold: u32,
    #[serde(default = "default_emergency_threshold")]
    pub emergency_threshold: u32,
    #[serde(default = "default_high_value_limit")]
    pub high_value_limit: f64,
    /// Depth-1 delegations at or below this value carry no liability.
    #[serde(default = "default_trivial_value_limit")]
    pub trivial_value_limit: f64,
    /// When set, external delegation requires executive sign-off.
    #[serde(default = "default_restrict_external")]
    pub restrict_external_delegation: bool,
    #[serde(default = "default_emergency_contact")]
    pub emergency_contact: String,
}

impl Default for FirebreakConfig {
    fn default() -> Self {
        Self {
            supervisor_threshold: default_supervisor_threshold(),
            manager_threshold: default_manager_threshold(),
            executive_threshold: default_executive_threshold(),
            emergency_threshold: default_emergency_threshold(),
            high_value_limit: default_high_value_limit(),
            trivial_value_limit: default_trivial_value_limit(),
            restrict_external_delegation: default_restrict_external(),
            emergency_contact: default_emergency_contact(),
        }
    }
}

/// The situation the firebreak gate evaluates.
#[derive(Debug, Clone)]
pub struct FirebreakContext {
    pub delegation_depth: u32,
    pub estimated_value: f64,
    pub involves_critical_systems: bool,
    pub is_external_delegation: bool,
    /// Agents already in the chain, root delegator first.
    pub chain_agents: Vec<Uuid>,
}

/// Outcome of a firebreak evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebreakResult {
    pub firebreaks_passed: bool,
    pub blocking_firebreaks: Vec<String>,
    pub liability_level: LiabilityLevel,
    pub chain_length: usize,
    pub manual_override_available: bool,
    pub required_authority: AuthorityLevel,
    pub validation_timestamp: DateTime<Utc>,
}

/// Accountability gate, independent of the security detectors.
#[derive(Debug, Clone)]
pub struct FirebreakEnforcer {
    config: FirebreakConfig,
}

impl FirebreakEnforcer {
    pub fn new(config: FirebreakConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FirebreakConfig {
        &self.config
    }

    pub fn evaluate(&self, ctx: &FirebreakContext) -> FirebreakResult {
        self.evaluate_with_limits(ctx, None)
    }

    /// Evaluate the global firebreak table plus any per-contract limits.
    pub fn evaluate_with_limits(
        &self,
        ctx: &FirebreakContext,
        limits: Option<&FirebreakLimits>,
    ) -> FirebreakResult {
        let depth = ctx.delegation_depth;
        let mut blocking = Vec::new();
        let mut required_authority = AuthorityLevel::Agent;

        // Base liability from depth and value alone.
        let mut liability = if depth >= 4 {
            LiabilityLevel::Shared
        } else if depth > 1 {
            LiabilityLevel::Limited
        } else if ctx.estimated_value <= self.config.trivial_value_limit {
            LiabilityLevel::None
        } else {
            LiabilityLevel::Limited
        };

        if ctx.estimated_value > self.config.high_value_limit {
            blocking.push("high_value_delegation".to_string());
            required_authority = required_authority.max(AuthorityLevel::Manager);
            liability = LiabilityLevel::Full;
        }

        if ctx.involves_critical_systems {
            blocking.push("critical_system_delegation".to_string());
            required_authority = required_authority.max(AuthorityLevel::Manager);
            liability = LiabilityLevel::Full;
        }

        if ctx.is_external_delegation && self.config.restrict_external_delegation {
            blocking.push("external_delegation".to_string());
            required_authority = required_authority.max(AuthorityLevel::Executive);
            liability = LiabilityLevel::Full;
        }

        // Deep chains escalate authority but leave liability as computed.
        if depth > self.config.executive_threshold {
            blocking.push("deep_delegation_chain".to_string());
            required_authority = required_authority.max(AuthorityLevel::Emergency);
        }

        if let Some(limits) = limits {
            if let Some(max_depth) = limits.max_depth {
                if depth > max_depth {
                    blocking.push("contract_depth_limit".to_string());
                    required_authority = required_authority.max(AuthorityLevel::Manager);
                }
            }
            if let Some(max_value) = limits.max_estimated_value {
                if ctx.estimated_value > max_value {
                    blocking.push("contract_value_limit".to_string());
                    required_authority = required_authority.max(AuthorityLevel::Manager);
                }
            }
            if ctx.is_external_delegation && !limits.allow_external_delegation {
                let name = "external_delegation".to_string();
                if !blocking.contains(&name) {
                    blocking.push(name);
                    required_authority = required_authority.max(AuthorityLevel::Executive);
                    liability = LiabilityLevel::Full;
                }
            }
        }

        let firebreaks_passed = blocking.is_empty();
        FirebreakResult {
            firebreaks_passed,
            manual_override_available: !firebreaks_passed,
            blocking_firebreaks: blocking,
            liability_level: liability,
            chain_length: ctx.chain_agents.len(),
            required_authority,
            validation_timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enforcer() -> FirebreakEnforcer {
        FirebreakEnforcer::new(FirebreakConfig::default())
    }

    fn ctx(depth: u32, value: f64) -> FirebreakContext {
        FirebreakContext {
            delegation_depth: depth,
            estimated_value: value,
            involves_critical_systems: false,
            is_external_delegation: false,
            chain_agents: vec![Uuid::new_v4(); depth as usize],
        }
    }

    #[test]
    fn test_trivial_delegation_passes_with_no_liability() {
        let result = enforcer().evaluate(&ctx(1, 50.0));
        assert!(result.firebreaks_passed);
        assert!(result.blocking_firebreaks.is_empty());
        assert_eq!(result.liability_level, LiabilityLevel::None);
        assert_eq!(result.required_authority, AuthorityLevel::Agent);
        assert!(!result.manual_override_available);
    }

    #[test]
    fn test_mid_depth_is_limited_liability() {
        let result = enforcer().evaluate(&ctx(3, 50.0));
        assert!(result.firebreaks_passed);
        assert_eq!(result.liability_level, LiabilityLevel::Limited);
    }

    #[test]
    fn test_depth_four_is_shared_liability() {
        let result = enforcer().evaluate(&ctx(4, 50.0));
        assert!(result.firebreaks_passed);
        assert_eq!(result.liability_level, LiabilityLevel::Shared);
    }

    #[test]
    fn test_high_value_blocks_with_manager_authority() {
        // 75k over the 50k default limit at depth 2.
        let result = enforcer().evaluate(&ctx(2, 75_000.0));
        assert!(!result.firebreaks_passed);
        assert_eq!(
            result.blocking_firebreaks,
            vec!["high_value_delegation".to_string()],
        );
        assert_eq!(result.required_authority, AuthorityLevel::Manager);
        assert_eq!(result.liability_level, LiabilityLevel::Full);
        assert!(result.manual_override_available);
    }

    #[test]
    fn test_critical_systems_require_manager() {
        let mut c = ctx(2, 50.0);
        c.involves_critical_systems = true;
        let result = enforcer().evaluate(&c);
        assert_eq!(
            result.blocking_firebreaks,
            vec!["critical_system_delegation".to_string()],
        );
        assert_eq!(result.required_authority, AuthorityLevel::Manager);
        assert_eq!(result.liability_level, LiabilityLevel::Full);
    }

    #[test]
    fn test_external_delegation_requires_executive() {
        let mut c = ctx(2, 50.0);
        c.is_external_delegation = true;
        let result = enforcer().evaluate(&c);
        assert_eq!(result.required_authority, AuthorityLevel::Executive);
        assert_eq!(result.liability_level, LiabilityLevel::Full);
    }

    #[test]
    fn test_external_delegation_allowed_when_flag_off() {
        let config = FirebreakConfig {
            restrict_external_delegation: false,
            ..Default::default()
        };
        let mut c = ctx(2, 50.0);
        c.is_external_delegation = true;
        let result = FirebreakEnforcer::new(config).evaluate(&c);
        assert!(result.firebreaks_passed);
    }

    #[test]
    fn test_depth_past_executive_threshold_needs_emergency() {
        // executive_threshold default is 7; depth 8 escalates.
        let result = enforcer().evaluate(&ctx(8, 50.0));
        assert!(!result.firebreaks_passed);
        assert_eq!(result.required_authority, AuthorityLevel::Emergency);
        // Liability stays what depth dictated.
        assert_eq!(result.liability_level, LiabilityLevel::Shared);
    }

    #[test]
    fn test_depth_at_executive_threshold_passes() {
        let result = enforcer().evaluate(&ctx(7, 50.0));
        assert!(result.firebreaks_passed);
    }

    #[test]
    fn test_combined_triggers_take_max_authority() {
        let mut c = ctx(8, 75_000.0);
        c.involves_critical_systems = true;
        let result = enforcer().evaluate(&c);
        assert_eq!(result.blocking_firebreaks.len(), 3);
        assert_eq!(result.required_authority, AuthorityLevel::Emergency);
        assert_eq!(result.liability_level, LiabilityLevel::Full);
    }

    #[test]
    fn test_contract_limits_layer_on_top() {
        let limits = FirebreakLimits {
            max_depth: Some(1),
            max_estimated_value: Some(10.0),
            allow_external_delegation: false,
        };
        let result = enforcer().evaluate_with_limits(&ctx(2, 50.0), Some(&limits));
        assert!(!result.firebreaks_passed);
        assert!(result
            .blocking_firebreaks
            .contains(&"contract_depth_limit".to_string()));
        assert!(result
            .blocking_firebreaks
            .contains(&"contract_value_limit".to_string()));
    }

    #[test]
    fn test_chain_length_reported() {
        let result = enforcer().evaluate(&ctx(3, 50.0));
        assert_eq!(result.chain_length, 3);
    }
}
