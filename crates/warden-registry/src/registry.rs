use std::collections::HashMap;

use dashmap::DashMap;
use uuid::Uuid;

use warden_types::{
    AgentCapabilityManifest, Availability, Capability, Result, WardenError,
};

use crate::query::{
    AgentMatch, CapabilityQuery, CapabilityRow, RankOptions, RegistryStatistics,
};

/// Penalty factor applied per unit of workload saturation.
const WORKLOAD_PENALTY: f64 = 0.3;

/// Stores agent capability manifests and answers matching queries.
/// Manifests are mutated only through this component.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    manifests: DashMap<Uuid, AgentCapabilityManifest>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new manifest. Duplicate registration is rejected; use
    /// `update_manifest` to replace an existing one.
    pub fn register_manifest(&self, mut manifest: AgentCapabilityManifest) -> Result<()> {
        validate_manifest(&manifest)?;
        manifest.recompute_overall_confidence();
        match self.manifests.entry(manifest.agent_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(WardenError::invalid(format!(
                "manifest for agent {} already registered",
                manifest.agent_id,
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                tracing::info!(agent_id = %manifest.agent_id, agent = %manifest.agent_name,
                    capabilities = manifest.capabilities.len(), "registered manifest");
                slot.insert(manifest);
                Ok(())
            }
        }
    }

    pub fn update_manifest(&self, mut manifest: AgentCapabilityManifest) -> Result<()> {
        validate_manifest(&manifest)?;
        manifest.recompute_overall_confidence();
        match self.manifests.get_mut(&manifest.agent_id) {
            Some(mut slot) => {
                *slot = manifest;
                Ok(())
            }
            None => Err(WardenError::not_found("manifest", manifest.agent_id)),
        }
    }

    pub fn unregister(&self, agent_id: Uuid) -> Result<()> {
        self.manifests
            .remove(&agent_id)
            .map(|_| ())
            .ok_or_else(|| WardenError::not_found("manifest", agent_id))
    }

    pub fn get_manifest(&self, agent_id: Uuid) -> Option<AgentCapabilityManifest> {
        self.manifests.get(&agent_id).map(|m| m.clone())
    }

    pub fn list_manifests(&self) -> Vec<AgentCapabilityManifest> {
        let mut manifests: Vec<AgentCapabilityManifest> =
            self.manifests.iter().map(|m| m.clone()).collect();
        manifests.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));
        manifests
    }

    /// Ranked matching against a query. Agents whose clearance does not
    /// dominate `required_tlp_clearance` are excluded outright, never
    /// penalized.
    pub fn match_agents(&self, query: &CapabilityQuery) -> Vec<AgentMatch> {
        if query.required_categories.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<(AgentMatch, u64)> = Vec::new();
        for entry in self.manifests.iter() {
            let manifest = entry.value();
            if query.exclude_agents.contains(&manifest.agent_id) {
                continue;
            }
            if query.only_available
                && (manifest.availability != Availability::Available
                    || !manifest.has_spare_capacity())
            {
                continue;
            }
            if let Some(required) = query.required_tlp_clearance {
                match manifest.max_clearance() {
                    Some(clearance) if clearance.dominates(required) => {}
                    _ => continue,
                }
            }

            let matched: Vec<&Capability> = manifest
                .capabilities
                .iter()
                .filter(|cap| capability_in_categories(cap, &query.required_categories))
                .filter(|cap| {
                    query
                        .max_completion_time_ms
                        .is_none_or(|max| cap.completion_time_estimate_ms <= max)
                })
                .filter(|cap| {
                    query
                        .min_success_rate
                        .is_none_or(|min| cap.success_rate.unwrap_or(0.0) >= min)
                })
                .collect();
            if matched.is_empty() {
                continue;
            }

            let mean_confidence = matched
                .iter()
                .map(|c| c.confidence_level)
                .sum::<f64>()
                / matched.len() as f64;
            if let Some(min) = query.min_confidence {
                if mean_confidence < min {
                    continue;
                }
            }

            let coverage = matched.len() as f64 / query.required_categories.len() as f64;
            let score = mean_confidence * coverage * workload_factor(manifest, true);

            matches.push((
                AgentMatch {
                    agent_id: manifest.agent_id,
                    agent_name: manifest.agent_name.clone(),
                    score,
                    matched_capabilities: matched
                        .iter()
                        .map(|c| c.capability_id.clone())
                        .collect(),
                    rank: 0,
                },
                manifest.total_completions,
            ));
        }

        assign_ranks(matches)
    }

    /// Rank agents for a set of required capability ids, blending matched
    /// confidence with coverage.
    pub fn rank_agents(&self, required_caps: &[String], options: RankOptions) -> Vec<AgentMatch> {
        if required_caps.is_empty() {
            return Vec::new();
        }
        let weight = options.confidence_weight.clamp(0.0, 1.0);

        let mut matches: Vec<(AgentMatch, u64)> = Vec::new();
        for entry in self.manifests.iter() {
            let manifest = entry.value();
            let matched: Vec<&Capability> = manifest
                .capabilities
                .iter()
                .filter(|cap| required_caps.contains(&cap.capability_id))
                .collect();
            if matched.is_empty() {
                continue;
            }
            let mean_confidence = matched
                .iter()
                .map(|c| c.confidence_level)
                .sum::<f64>()
                / matched.len() as f64;
            let coverage = matched.len() as f64 / required_caps.len() as f64;
            let score = (weight * mean_confidence + (1.0 - weight) * coverage)
                * workload_factor(manifest, options.consider_workload);

            matches.push((
                AgentMatch {
                    agent_id: manifest.agent_id,
                    agent_name: manifest.agent_name.clone(),
                    score,
                    matched_capabilities: matched
                        .iter()
                        .map(|c| c.capability_id.clone())
                        .collect(),
                    rank: 0,
                },
                manifest.total_completions,
            ));
        }

        assign_ranks(matches)
    }

    /// Flat enumeration of every capability across all agents.
    pub fn query_capabilities(&self) -> Vec<CapabilityRow> {
        let mut rows: Vec<CapabilityRow> = self
            .manifests
            .iter()
            .flat_map(|entry| {
                let manifest = entry.value();
                manifest
                    .capabilities
                    .iter()
                    .map(|cap| CapabilityRow {
                        agent_id: manifest.agent_id,
                        agent_name: manifest.agent_name.clone(),
                        capability_id: cap.capability_id.clone(),
                        name: cap.name.clone(),
                        confidence_level: cap.confidence_level,
                        tlp_clearance: cap.tlp_clearance,
                        tags: cap.tags.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        rows.sort_by(|a, b| {
            a.agent_id
                .cmp(&b.agent_id)
                .then_with(|| a.capability_id.cmp(&b.capability_id))
        });
        rows
    }

    pub fn increment_workload(&self, agent_id: Uuid) -> Result<()> {
        let mut manifest = self
            .manifests
            .get_mut(&agent_id)
            .ok_or_else(|| WardenError::not_found("manifest", agent_id))?;
        if !manifest.has_spare_capacity() {
            return Err(WardenError::invalid(format!(
                "agent {} is at max concurrent tasks ({})",
                agent_id, manifest.max_concurrent_tasks,
            )));
        }
        manifest.current_workload += 1;
        Ok(())
    }

    pub fn decrement_workload(&self, agent_id: Uuid) -> Result<()> {
        let mut manifest = self
            .manifests
            .get_mut(&agent_id)
            .ok_or_else(|| WardenError::not_found("manifest", agent_id))?;
        manifest.current_workload = manifest.current_workload.saturating_sub(1);
        Ok(())
    }

    pub fn update_availability(&self, agent_id: Uuid, availability: Availability) -> Result<()> {
        let mut manifest = self
            .manifests
            .get_mut(&agent_id)
            .ok_or_else(|| WardenError::not_found("manifest", agent_id))?;
        manifest.availability = availability;
        Ok(())
    }

    /// Record a completed task against the manifest's rolling counters.
    pub fn record_completion(&self, agent_id: Uuid, completion_time_ms: u64) -> Result<()> {
        let mut manifest = self
            .manifests
            .get_mut(&agent_id)
            .ok_or_else(|| WardenError::not_found("manifest", agent_id))?;
        let total = manifest.total_completions;
        manifest.avg_completion_time_ms =
            ((manifest.avg_completion_time_ms as u128 * total as u128
                + completion_time_ms as u128)
                / (total as u128 + 1)) as u64;
        manifest.total_completions += 1;
        Ok(())
    }

    pub fn statistics(&self) -> RegistryStatistics {
        let total_agents = self.manifests.len();
        let mut total_capabilities = 0usize;
        let mut confidence_sum = 0.0;
        let mut available_agents = 0usize;
        let mut capability_distribution: HashMap<String, usize> = HashMap::new();

        for entry in self.manifests.iter() {
            let manifest = entry.value();
            total_capabilities += manifest.capabilities.len();
            if manifest.availability == Availability::Available {
                available_agents += 1;
            }
            for cap in &manifest.capabilities {
                confidence_sum += cap.confidence_level;
                if cap.tags.is_empty() {
                    *capability_distribution
                        .entry(cap.capability_id.clone())
                        .or_default() += 1;
                } else {
                    for tag in &cap.tags {
                        *capability_distribution.entry(tag.clone()).or_default() += 1;
                    }
                }
            }
        }

        RegistryStatistics {
            total_agents,
            total_capabilities,
            avg_capabilities_per_agent: if total_agents == 0 {
                0.0
            } else {
                total_capabilities as f64 / total_agents as f64
            },
            avg_confidence: if total_capabilities == 0 {
                0.0
            } else {
                confidence_sum / total_capabilities as f64
            },
            available_agents,
            capability_distribution,
        }
    }
}

fn capability_in_categories(cap: &Capability, categories: &[String]) -> bool {
    categories
        .iter()
        .any(|cat| cap.capability_id == *cat || cap.tags.contains(cat))
}

fn workload_factor(manifest: &AgentCapabilityManifest, consider_workload: bool) -> f64 {
    if !consider_workload || manifest.max_concurrent_tasks == 0 {
        return 1.0;
    }
    let saturation = manifest.current_workload as f64 / manifest.max_concurrent_tasks as f64;
    (1.0 - WORKLOAD_PENALTY * saturation).clamp(0.0, 1.0)
}

/// Sort descending by score, break ties by total completions then agent id,
/// and assign 1-based ranks.
fn assign_ranks(mut matches: Vec<(AgentMatch, u64)>) -> Vec<AgentMatch> {
    matches.sort_by(|(a, a_completions), (b, b_completions)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b_completions.cmp(a_completions))
            .then_with(|| a.agent_id.to_string().cmp(&b.agent_id.to_string()))
    });
    matches
        .into_iter()
        .enumerate()
        .map(|(i, (mut m, _))| {
            m.rank = i + 1;
            m
        })
        .collect()
}

fn validate_manifest(manifest: &AgentCapabilityManifest) -> Result<()> {
    if manifest.agent_name.is_empty() {
        return Err(WardenError::invalid("agent_name must not be empty"));
    }
    if manifest.max_concurrent_tasks == 0 {
        return Err(WardenError::invalid(
            "max_concurrent_tasks must be at least 1",
        ));
    }
    if manifest.current_workload > manifest.max_concurrent_tasks {
        return Err(WardenError::invalid(format!(
            "current_workload {} exceeds max_concurrent_tasks {}",
            manifest.current_workload, manifest.max_concurrent_tasks,
        )));
    }
    for cap in &manifest.capabilities {
        if !(0.0..=1.0).contains(&cap.confidence_level) || cap.confidence_level.is_nan() {
            return Err(WardenError::invalid(format!(
                "capability {} confidence_level {} out of [0, 1]",
                cap.capability_id, cap.confidence_level,
            )));
        }
        if let Some(rate) = cap.success_rate {
            if !(0.0..=1.0).contains(&rate) || rate.is_nan() {
                return Err(WardenError::invalid(format!(
                    "capability {} success_rate {} out of [0, 1]",
                    cap.capability_id, rate,
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_types::TlpLevel;

    fn manifest(name: &str, caps: &[(&str, f64, TlpLevel)]) -> AgentCapabilityManifest {
        let capabilities = caps
            .iter()
            .map(|(id, conf, tlp)| {
                Capability::new(*id, *id)
                    .with_confidence(*conf)
                    .with_clearance(*tlp)
            })
            .collect();
        AgentCapabilityManifest::new(Uuid::new_v4(), name).with_capabilities(capabilities)
    }

    fn query(categories: &[&str]) -> CapabilityQuery {
        CapabilityQuery {
            required_categories: categories.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let registry = CapabilityRegistry::new();
        let m = manifest("worker", &[("documentation", 0.8, TlpLevel::Green)]);
        registry.register_manifest(m.clone()).unwrap();
        assert!(registry.register_manifest(m).is_err());
    }

    #[test]
    fn test_register_validates_confidence_range() {
        let registry = CapabilityRegistry::new();
        let m = manifest("worker", &[("documentation", 1.4, TlpLevel::Green)]);
        assert!(registry.register_manifest(m).is_err());
    }

    #[test]
    fn test_register_then_get_is_identity() {
        let registry = CapabilityRegistry::new();
        let m = manifest(
            "worker",
            &[
                ("documentation", 0.8, TlpLevel::Green),
                ("code_review", 0.6, TlpLevel::Clear),
            ],
        );
        registry.register_manifest(m.clone()).unwrap();
        let loaded = registry.get_manifest(m.agent_id).unwrap();
        assert_eq!(loaded.agent_id, m.agent_id);
        assert_eq!(loaded.capabilities.len(), 2);
        assert_eq!(
            loaded.capabilities[0].capability_id,
            m.capabilities[0].capability_id,
        );
    }

    #[test]
    fn test_match_score_is_confidence_times_coverage() {
        let registry = CapabilityRegistry::new();
        let m = manifest(
            "partial",
            &[("documentation", 0.8, TlpLevel::Green)],
        );
        registry.register_manifest(m).unwrap();

        // One of two required categories matched: coverage 0.5.
        let matches = registry.match_agents(&query(&["documentation", "testing"]));
        assert_eq!(matches.len(), 1);
        assert!((matches[0].score - 0.8 * 0.5).abs() < 1e-9);
        assert_eq!(matches[0].rank, 1);
    }

    #[test]
    fn test_match_excludes_insufficient_clearance() {
        let registry = CapabilityRegistry::new();
        registry
            .register_manifest(manifest("low", &[("documentation", 0.9, TlpLevel::Clear)]))
            .unwrap();
        registry
            .register_manifest(manifest("high", &[("documentation", 0.5, TlpLevel::Red)]))
            .unwrap();

        let mut q = query(&["documentation"]);
        q.required_tlp_clearance = Some(TlpLevel::Amber);
        let matches = registry.match_agents(&q);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].agent_name, "high");
    }

    #[test]
    fn test_match_empty_when_below_min_confidence() {
        let registry = CapabilityRegistry::new();
        registry
            .register_manifest(manifest("weak", &[("documentation", 0.2, TlpLevel::Green)]))
            .unwrap();
        let mut q = query(&["documentation"]);
        q.min_confidence = Some(0.5);
        assert!(registry.match_agents(&q).is_empty());
    }

    #[test]
    fn test_workload_penalty_applied() {
        let registry = CapabilityRegistry::new();
        let mut m = manifest("busy", &[("documentation", 1.0, TlpLevel::Green)]);
        m.max_concurrent_tasks = 2;
        m.current_workload = 2;
        // Fully saturated: factor = 1 - 0.3 * 1.0 = 0.7.
        let agent_id = m.agent_id;
        registry.register_manifest(m).unwrap();
        let matches = registry.match_agents(&query(&["documentation"]));
        assert_eq!(matches[0].agent_id, agent_id);
        assert!((matches[0].score - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_rank_ties_broken_by_completions() {
        let registry = CapabilityRegistry::new();
        let mut veteran = manifest("veteran", &[("documentation", 0.8, TlpLevel::Green)]);
        veteran.total_completions = 100;
        let rookie = manifest("rookie", &[("documentation", 0.8, TlpLevel::Green)]);
        registry.register_manifest(rookie).unwrap();
        registry.register_manifest(veteran).unwrap();

        let matches = registry.match_agents(&query(&["documentation"]));
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].agent_name, "veteran");
        assert_eq!(matches[0].rank, 1);
        assert_eq!(matches[1].rank, 2);
    }

    #[test]
    fn test_only_available_filters_busy_agents() {
        let registry = CapabilityRegistry::new();
        let mut offline = manifest("offline", &[("documentation", 0.9, TlpLevel::Green)]);
        offline.availability = Availability::Offline;
        registry.register_manifest(offline).unwrap();
        registry
            .register_manifest(manifest("up", &[("documentation", 0.8, TlpLevel::Green)]))
            .unwrap();

        let mut q = query(&["documentation"]);
        q.only_available = true;
        let matches = registry.match_agents(&q);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].agent_name, "up");
    }

    #[test]
    fn test_workload_counters() {
        let registry = CapabilityRegistry::new();
        let mut m = manifest("worker", &[("documentation", 0.8, TlpLevel::Green)]);
        m.max_concurrent_tasks = 1;
        let id = m.agent_id;
        registry.register_manifest(m).unwrap();

        registry.increment_workload(id).unwrap();
        // At capacity now.
        assert!(registry.increment_workload(id).is_err());
        registry.decrement_workload(id).unwrap();
        registry.increment_workload(id).unwrap();
        // Decrement below zero saturates.
        registry.decrement_workload(id).unwrap();
        registry.decrement_workload(id).unwrap();
        assert_eq!(registry.get_manifest(id).unwrap().current_workload, 0);
    }

    #[test]
    fn test_statistics() {
        let registry = CapabilityRegistry::new();
        registry
            .register_manifest(manifest(
                "a",
                &[
                    ("documentation", 0.8, TlpLevel::Green),
                    ("testing", 0.6, TlpLevel::Clear),
                ],
            ))
            .unwrap();
        registry
            .register_manifest(manifest("b", &[("documentation", 0.4, TlpLevel::Green)]))
            .unwrap();

        let stats = registry.statistics();
        assert_eq!(stats.total_agents, 2);
        assert_eq!(stats.total_capabilities, 3);
        assert!((stats.avg_capabilities_per_agent - 1.5).abs() < 1e-9);
        assert!((stats.avg_confidence - 0.6).abs() < 1e-9);
        assert_eq!(stats.available_agents, 2);
        assert_eq!(stats.capability_distribution["documentation"], 2);
    }

    #[test]
    fn test_query_capabilities_flat() {
        let registry = CapabilityRegistry::new();
        registry
            .register_manifest(manifest(
                "a",
                &[
                    ("documentation", 0.8, TlpLevel::Green),
                    ("testing", 0.6, TlpLevel::Clear),
                ],
            ))
            .unwrap();
        let rows = registry.query_capabilities();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.capability_id == "testing"));
    }

    #[test]
    fn test_rank_agents_confidence_weight() {
        let registry = CapabilityRegistry::new();
        registry
            .register_manifest(manifest(
                "focused",
                &[("documentation", 0.9, TlpLevel::Green)],
            ))
            .unwrap();
        registry
            .register_manifest(manifest(
                "broad",
                &[
                    ("documentation", 0.5, TlpLevel::Green),
                    ("testing", 0.5, TlpLevel::Green),
                ],
            ))
            .unwrap();

        let required = vec!["documentation".to_string(), "testing".to_string()];
        // Pure coverage: broad covers both, focused covers one.
        let by_coverage = registry.rank_agents(
            &required,
            RankOptions {
                confidence_weight: 0.0,
                consider_workload: false,
            },
        );
        assert_eq!(by_coverage[0].agent_name, "broad");

        // Pure confidence: focused wins on its matched capability.
        let by_confidence = registry.rank_agents(
            &required,
            RankOptions {
                confidence_weight: 1.0,
                consider_workload: false,
            },
        );
        assert_eq!(by_confidence[0].agent_name, "focused");
    }

    #[test]
    fn test_unregister() {
        let registry = CapabilityRegistry::new();
        let m = manifest("worker", &[("documentation", 0.8, TlpLevel::Green)]);
        let id = m.agent_id;
        registry.register_manifest(m).unwrap();
        registry.unregister(id).unwrap();
        assert!(registry.get_manifest(id).is_none());
        assert!(registry.unregister(id).is_err());
    }
}
