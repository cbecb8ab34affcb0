use serde::{Deserialize, Serialize};

use warden_types::ThreatSeverity;

use crate::threat::{ThreatFinding, ThreatType, ValidationContext};

fn default_dangerous_keywords() -> Vec<String> {
    ["admin", "root", "execute", "delete", "manage", "modify_system"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_max_actions() -> usize {
    5
}

fn default_max_chain_depth() -> u32 {
    5
}

/// Configuration for the permission-escalation detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EscalationConfig {
    #[serde(default = "default_dangerous_keywords")]
    pub dangerous_keywords: Vec<String>,
    #[serde(default = "default_max_actions")]
    pub max_actions: usize,
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: u32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            dangerous_keywords: default_dangerous_keywords(),
            max_actions: default_max_actions(),
            max_chain_depth: default_max_chain_depth(),
        }
    }
}

/// Permission-escalation detector. Four sub-conditions; severity scales
/// with how many fire (one: medium, two: high, three or more: critical).
pub fn detect_escalation(
    config: &EscalationConfig,
    ctx: &ValidationContext,
) -> Option<ThreatFinding> {
    let mut sub_findings = Vec::new();

    let dangerous: Vec<&str> = ctx
        .scopes
        .iter()
        .chain(ctx.actions.iter())
        .filter(|item| {
            let lowered = item.to_lowercase();
            config
                .dangerous_keywords
                .iter()
                .any(|kw| lowered.contains(kw))
        })
        .map(|s| s.as_str())
        .collect();
    if !dangerous.is_empty() {
        sub_findings.push(format!(
            "dangerous scopes or actions requested: {}",
            dangerous.join(", "),
        ));
    }

    if ctx.actions.len() > config.max_actions {
        sub_findings.push(format!(
            "action count {} exceeds {}",
            ctx.actions.len(),
            config.max_actions,
        ));
    }

    if ctx.delegation_depth > config.max_chain_depth {
        sub_findings.push(format!(
            "declared delegation depth {} exceeds chain limit {}",
            ctx.delegation_depth, config.max_chain_depth,
        ));
    }

    if let Some(parent_tlp) = ctx.parent_tlp {
        if ctx.child_tlp > parent_tlp && ctx.tlp_justification.is_none() {
            sub_findings.push(format!(
                "TLP escalation {parent_tlp} -> {} without justification",
                ctx.child_tlp,
            ));
        }
    }

    if sub_findings.is_empty() {
        return None;
    }
    let severity = match sub_findings.len() {
        1 => ThreatSeverity::Medium,
        2 => ThreatSeverity::High,
        _ => ThreatSeverity::Critical,
    };
    Some(
        ThreatFinding::new(
            ThreatType::PermissionEscalation,
            severity,
            ctx.delegator.id,
            ctx.delegatee.id,
            format!("{} escalation conditions fired", sub_findings.len()),
        )
        .with_sub_findings(sub_findings),
    )
}

fn default_window_hours() -> i64 {
    24
}

fn default_mutual_pair_threshold() -> usize {
    4
}

fn default_min_credible_completions() -> u64 {
    10
}

/// Configuration for the reputation-gaming detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GamingConfig {
    /// Sliding window over which delegation pairs are counted.
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
    /// Mutual A<->B pairs beyond this count get flagged.
    #[serde(default = "default_mutual_pair_threshold")]
    pub mutual_pair_threshold: usize,
    /// A perfect success rate below this many completions is suspicious.
    #[serde(default = "default_min_credible_completions")]
    pub min_credible_completions: u64,
}

impl Default for GamingConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            mutual_pair_threshold: default_mutual_pair_threshold(),
            min_credible_completions: default_min_credible_completions(),
        }
    }
}

/// Reputation-gaming detector. `mutual_pairs` is the number of reciprocal
/// delegations between the two agents inside the window, counted by the
/// validator's history.
pub fn detect_gaming(
    config: &GamingConfig,
    ctx: &ValidationContext,
    mutual_pairs: usize,
) -> Vec<ThreatFinding> {
    let mut findings = Vec::new();

    if mutual_pairs > config.mutual_pair_threshold {
        findings.push(ThreatFinding::new(
            ThreatType::ReputationGaming,
            ThreatSeverity::Medium,
            ctx.delegator.id,
            ctx.delegatee.id,
            format!(
                "{mutual_pairs} mutual delegations between {} and {} within {}h",
                ctx.delegator.name, ctx.delegatee.name, config.window_hours,
            ),
        ));
    }

    if ctx.delegatee_success_rate == Some(1.0)
        && ctx.delegatee_total_completions < config.min_credible_completions
    {
        findings.push(ThreatFinding::new(
            ThreatType::ReputationGaming,
            ThreatSeverity::Medium,
            ctx.delegator.id,
            ctx.delegatee.id,
            format!(
                "perfect success rate with only {} completions",
                ctx.delegatee_total_completions,
            ),
        ));
    }

    findings
}

fn default_max_memory_mb() -> u64 {
    8192
}

fn default_max_cpu_cores() -> f64 {
    8.0
}

fn default_max_disk_mb() -> u64 {
    100_000
}

fn default_max_contracts_per_hour() -> usize {
    20
}

/// Configuration for the abuse-pattern detector. The caps differ across
/// deployments, so they are configuration rather than constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AbuseConfig {
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: u64,
    #[serde(default = "default_max_cpu_cores")]
    pub max_cpu_cores: f64,
    #[serde(default = "default_max_disk_mb")]
    pub max_disk_mb: u64,
    #[serde(default = "default_max_contracts_per_hour")]
    pub max_contracts_per_hour: usize,
}

impl Default for AbuseConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: default_max_memory_mb(),
            max_cpu_cores: default_max_cpu_cores(),
            max_disk_mb: default_max_disk_mb(),
            max_contracts_per_hour: default_max_contracts_per_hour(),
        }
    }
}

/// Abuse-pattern detector. `recent_contracts` is the delegator's request
/// count over the last hour.
pub fn detect_abuse(
    config: &AbuseConfig,
    ctx: &ValidationContext,
    recent_contracts: usize,
) -> Vec<ThreatFinding> {
    let mut findings = Vec::new();

    if let Some(resources) = &ctx.resource_requirements {
        let mut over = Vec::new();
        if resources.memory_mb > config.max_memory_mb {
            over.push(format!(
                "memory_mb {} > {}",
                resources.memory_mb, config.max_memory_mb,
            ));
        }
        if resources.cpu_cores > config.max_cpu_cores {
            over.push(format!(
                "cpu_cores {} > {}",
                resources.cpu_cores, config.max_cpu_cores,
            ));
        }
        if resources.disk_mb > config.max_disk_mb {
            over.push(format!(
                "disk_mb {} > {}",
                resources.disk_mb, config.max_disk_mb,
            ));
        }
        if !over.is_empty() {
            findings.push(
                ThreatFinding::new(
                    ThreatType::AbusePattern,
                    ThreatSeverity::High,
                    ctx.delegator.id,
                    ctx.delegatee.id,
                    "resource request above caps",
                )
                .with_sub_findings(over),
            );
        }
    }

    if recent_contracts > config.max_contracts_per_hour {
        findings.push(ThreatFinding::new(
            ThreatType::AbusePattern,
            ThreatSeverity::High,
            ctx.delegator.id,
            ctx.delegatee.id,
            format!(
                "{} delegations in the last hour exceeds {}",
                recent_contracts, config.max_contracts_per_hour,
            ),
        ));
    }

    findings
}

fn default_baseline_window() -> usize {
    20
}

fn default_anomaly_multiplier() -> f64 {
    10.0
}

fn default_min_baseline_samples() -> usize {
    3
}

/// Configuration for the anomaly detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnomalyConfig {
    /// How many recent contracts form the per-delegator baseline.
    #[serde(default = "default_baseline_window")]
    pub baseline_window: usize,
    #[serde(default = "default_anomaly_multiplier")]
    pub multiplier: f64,
    /// Below this many samples there is no baseline to deviate from.
    #[serde(default = "default_min_baseline_samples")]
    pub min_baseline_samples: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            baseline_window: default_baseline_window(),
            multiplier: default_anomaly_multiplier(),
            min_baseline_samples: default_min_baseline_samples(),
        }
    }
}

/// A delegator's recent-request baseline sample.
#[derive(Debug, Clone, Copy)]
pub struct BaselineSample {
    pub tlp_rank: u8,
    pub duration_ms: u64,
}

/// Anomaly detector: flags when the current request's TLP rank or
/// estimated duration exceeds the baseline mean by the configured
/// multiplier.
pub fn detect_anomaly(
    config: &AnomalyConfig,
    ctx: &ValidationContext,
    baseline: &[BaselineSample],
) -> Vec<ThreatFinding> {
    if baseline.len() < config.min_baseline_samples {
        return Vec::new();
    }
    let mut findings = Vec::new();
    let n = baseline.len() as f64;
    let mean_tlp = baseline.iter().map(|s| s.tlp_rank as f64).sum::<f64>() / n;
    let mean_duration = baseline.iter().map(|s| s.duration_ms as f64).sum::<f64>() / n;

    if mean_tlp > 0.0 && ctx.child_tlp.rank() as f64 > config.multiplier * mean_tlp {
        findings.push(ThreatFinding::new(
            ThreatType::Anomaly,
            ThreatSeverity::Medium,
            ctx.delegator.id,
            ctx.delegatee.id,
            format!(
                "TLP {} far above delegator baseline (mean rank {mean_tlp:.2})",
                ctx.child_tlp,
            ),
        ));
    }
    if mean_duration > 0.0
        && ctx.estimated_duration_ms as f64 > config.multiplier * mean_duration
    {
        findings.push(ThreatFinding::new(
            ThreatType::Anomaly,
            ThreatSeverity::Medium,
            ctx.delegator.id,
            ctx.delegatee.id,
            format!(
                "estimated duration {}ms is over {}x the delegator baseline mean {mean_duration:.0}ms",
                ctx.estimated_duration_ms, config.multiplier,
            ),
        ));
    }
    findings
}
