use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed aggregate weights: reliability 0.40, speed 0.20, quality 0.30,
/// security 0.10.
pub const WEIGHT_RELIABILITY: f64 = 0.40;
pub const WEIGHT_SPEED: f64 = 0.20;
pub const WEIGHT_QUALITY: f64 = 0.30;
pub const WEIGHT_SECURITY: f64 = 0.10;

/// The four tracked dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationDimension {
    Reliability,
    Speed,
    Quality,
    Security,
}

impl ReputationDimension {
    pub fn as_str(self) -> &'static str {
        match self {
            ReputationDimension::Reliability => "reliability",
            ReputationDimension::Speed => "speed",
            ReputationDimension::Quality => "quality",
            ReputationDimension::Security => "security",
        }
    }
}

/// Per-agent, time-evolving reputation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationRecord {
    pub agent_id: Uuid,
    pub reliability: f64,
    pub speed: f64,
    pub quality: f64,
    pub security: f64,
    /// Weighted aggregate, recomputed whenever any dimension changes.
    pub aggregate: f64,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub total_completions: u64,
    pub specializations: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl ReputationRecord {
    pub fn new(agent_id: Uuid) -> Self {
        let mut record = Self {
            agent_id,
            reliability: 0.5,
            speed: 0.5,
            quality: 0.5,
            security: 0.5,
            aggregate: 0.0,
            consecutive_successes: 0,
            consecutive_failures: 0,
            total_completions: 0,
            specializations: Vec::new(),
            last_updated: Utc::now(),
        };
        record.recompute_aggregate();
        record
    }

    pub fn dimension(&self, dim: ReputationDimension) -> f64 {
        match dim {
            ReputationDimension::Reliability => self.reliability,
            ReputationDimension::Speed => self.speed,
            ReputationDimension::Quality => self.quality,
            ReputationDimension::Security => self.security,
        }
    }

    /// EMA update of one dimension: `new = alpha * observation + (1 - alpha) * current`,
    /// clamped to [0, 1].
    pub fn observe(&mut self, dim: ReputationDimension, observation: f64, alpha: f64) {
        let observation = observation.clamp(0.0, 1.0);
        let current = self.dimension(dim);
        let updated = (alpha * observation + (1.0 - alpha) * current).clamp(0.0, 1.0);
        match dim {
            ReputationDimension::Reliability => self.reliability = updated,
            ReputationDimension::Speed => self.speed = updated,
            ReputationDimension::Quality => self.quality = updated,
            ReputationDimension::Security => self.security = updated,
        }
        self.recompute_aggregate();
        self.last_updated = Utc::now();
    }

    pub fn recompute_aggregate(&mut self) {
        self.aggregate = self.reliability * WEIGHT_RELIABILITY
            + self.speed * WEIGHT_SPEED
            + self.quality * WEIGHT_QUALITY
            + self.security * WEIGHT_SECURITY;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_aggregate() {
        let r = ReputationRecord::new(Uuid::new_v4());
        // All dimensions at 0.5 with weights summing to 1.0.
        assert!((r.aggregate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_ema_observation() {
        let mut r = ReputationRecord::new(Uuid::new_v4());
        r.observe(ReputationDimension::Reliability, 1.0, 0.3);
        // 0.3 * 1.0 + 0.7 * 0.5 = 0.65
        assert!((r.reliability - 0.65).abs() < 1e-9);
        // Aggregate tracks the change: 0.65*0.4 + 0.5*0.2 + 0.5*0.3 + 0.5*0.1
        let expected = 0.65 * 0.4 + 0.5 * 0.2 + 0.5 * 0.3 + 0.5 * 0.1;
        assert!((r.aggregate - expected).abs() < 1e-9);
    }

    #[test]
    fn test_observation_clamped() {
        let mut r = ReputationRecord::new(Uuid::new_v4());
        r.observe(ReputationDimension::Speed, 12.0, 0.3);
        assert!(r.speed <= 1.0);
        r.observe(ReputationDimension::Speed, -3.0, 0.3);
        assert!(r.speed >= 0.0);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let sum = WEIGHT_RELIABILITY + WEIGHT_SPEED + WEIGHT_QUALITY + WEIGHT_SECURITY;
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
