use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::detectors::{
    AbuseConfig, AnomalyConfig, BaselineSample, EscalationConfig, GamingConfig,
    detect_abuse, detect_anomaly, detect_escalation, detect_gaming,
};
use crate::threat::{SecurityAction, SecurityVerdict, ThreatFinding, ValidationContext};

const RECENT_THREATS_CAPACITY: usize = 100;

/// Combined configuration for all four detectors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityConfig {
    #[serde(default)]
    pub escalation: EscalationConfig,
    #[serde(default)]
    pub gaming: GamingConfig,
    #[serde(default)]
    pub abuse: AbuseConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
}

/// Aggregate statistics over every validation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityStatistics {
    pub total_validations: u64,
    pub threats_detected: u64,
    pub threat_types: HashMap<String, u64>,
    pub severity_distribution: HashMap<String, u64>,
    pub action_distribution: HashMap<String, u64>,
    pub recent_threats: Vec<ThreatFinding>,
}

/// Pre-admission security validator. All four detectors run on every
/// request; the worst-severity finding decides the action.
pub struct SecurityValidator {
    config: SecurityConfig,
    /// Directed delegation history per (delegator, delegatee) pair.
    pair_history: DashMap<(Uuid, Uuid), Vec<DateTime<Utc>>>,
    /// Per-delegator recent requests, newest last.
    delegator_history: DashMap<Uuid, VecDeque<(DateTime<Utc>, BaselineSample)>>,
    stats: Mutex<SecurityStatsInner>,
}

#[derive(Default)]
struct SecurityStatsInner {
    total_validations: u64,
    threats_detected: u64,
    threat_types: HashMap<String, u64>,
    severity_distribution: HashMap<String, u64>,
    action_distribution: HashMap<String, u64>,
    recent_threats: VecDeque<ThreatFinding>,
}

impl SecurityValidator {
    pub fn new(config: SecurityConfig) -> Self {
        Self {
            config,
            pair_history: DashMap::new(),
            delegator_history: DashMap::new(),
            stats: Mutex::new(SecurityStatsInner::default()),
        }
    }

    /// Run all detectors against one request and record it into the
    /// sliding-window histories.
    pub async fn validate(&self, ctx: &ValidationContext) -> SecurityVerdict {
        let window = Duration::hours(self.config.gaming.window_hours);
        let mutual_pairs = self.mutual_pairs(ctx.delegator.id, ctx.delegatee.id, ctx.timestamp, window);
        let recent_contracts = self.recent_request_count(ctx.delegator.id, ctx.timestamp);
        let baseline = self.baseline_for(ctx.delegator.id);

        let mut findings: Vec<ThreatFinding> = Vec::new();
        if let Some(finding) = detect_escalation(&self.config.escalation, ctx) {
            findings.push(finding);
        }
        findings.extend(detect_gaming(&self.config.gaming, ctx, mutual_pairs));
        findings.extend(detect_abuse(&self.config.abuse, ctx, recent_contracts));
        findings.extend(detect_anomaly(&self.config.anomaly, ctx, &baseline));

        let worst_severity = findings.iter().map(|f| f.severity).max();
        let action = SecurityAction::for_severity(worst_severity);

        if action == SecurityAction::AllowWithWarning {
            for finding in &findings {
                tracing::warn!(
                    threat_type = finding.threat_type.as_str(),
                    severity = finding.severity.as_str(),
                    "admitting with warning: {}",
                    finding.description,
                );
            }
        }

        self.record_request(ctx, window);
        self.record_stats(&findings, action).await;

        SecurityVerdict {
            action,
            worst_severity,
            findings,
        }
    }

    pub async fn statistics(&self) -> SecurityStatistics {
        let stats = self.stats.lock().await;
        SecurityStatistics {
            total_validations: stats.total_validations,
            threats_detected: stats.threats_detected,
            threat_types: stats.threat_types.clone(),
            severity_distribution: stats.severity_distribution.clone(),
            action_distribution: stats.action_distribution.clone(),
            recent_threats: stats.recent_threats.iter().cloned().collect(),
        }
    }

    /// Reciprocal delegations between two agents inside the window: the
    /// smaller of the two directed counts.
    fn mutual_pairs(
        &self,
        delegator: Uuid,
        delegatee: Uuid,
        now: DateTime<Utc>,
        window: Duration,
    ) -> usize {
        let count = |from: Uuid, to: Uuid| {
            self.pair_history
                .get(&(from, to))
                .map(|times| {
                    times
                        .iter()
                        .filter(|t| now.signed_duration_since(**t) <= window)
                        .count()
                })
                .unwrap_or(0)
        };
        // Include the request under test in the forward direction.
        let forward = count(delegator, delegatee) + 1;
        let reverse = count(delegatee, delegator);
        forward.min(reverse)
    }

    fn recent_request_count(&self, delegator: Uuid, now: DateTime<Utc>) -> usize {
        self.delegator_history
            .get(&delegator)
            .map(|history| {
                history
                    .iter()
                    .filter(|(t, _)| now.signed_duration_since(*t) <= Duration::hours(1))
                    .count()
            })
            .unwrap_or(0)
    }

    fn baseline_for(&self, delegator: Uuid) -> Vec<BaselineSample> {
        self.delegator_history
            .get(&delegator)
            .map(|history| {
                history
                    .iter()
                    .rev()
                    .take(self.config.anomaly.baseline_window)
                    .map(|(_, sample)| *sample)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn record_request(&self, ctx: &ValidationContext, window: Duration) {
        let mut pair = self
            .pair_history
            .entry((ctx.delegator.id, ctx.delegatee.id))
            .or_default();
        pair.push(ctx.timestamp);
        pair.retain(|t| ctx.timestamp.signed_duration_since(*t) <= window);
        drop(pair);

        let mut history = self.delegator_history.entry(ctx.delegator.id).or_default();
        history.push_back((
            ctx.timestamp,
            BaselineSample {
                tlp_rank: ctx.child_tlp.rank(),
                duration_ms: ctx.estimated_duration_ms,
            },
        ));
        while history.len() > self.config.anomaly.baseline_window.max(64) {
            history.pop_front();
        }
    }

    async fn record_stats(&self, findings: &[ThreatFinding], action: SecurityAction) {
        let mut stats = self.stats.lock().await;
        stats.total_validations += 1;
        stats.threats_detected += findings.len() as u64;
        *stats
            .action_distribution
            .entry(action.as_str().to_string())
            .or_default() += 1;
        for finding in findings {
            *stats
                .threat_types
                .entry(finding.threat_type.as_str().to_string())
                .or_default() += 1;
            *stats
                .severity_distribution
                .entry(finding.severity.as_str().to_string())
                .or_default() += 1;
            stats.recent_threats.push_back(finding.clone());
            while stats.recent_threats.len() > RECENT_THREATS_CAPACITY {
                stats.recent_threats.pop_front();
            }
        }
    }
}
