use serde::{Deserialize, Serialize};
use uuid::Uuid;

use warden_types::{AgentCapabilityManifest, Capability, Result, TlpLevel};

use crate::detector::{DetectedCapability, DetectorConfig, detect_capabilities};
use crate::keywords::KeywordTable;
use crate::parser::{AgentDefinition, DefinitionSource, parse_definition};

/// Confidence clamp applied to every initialized capability.
pub const CONFIDENCE_FLOOR: f64 = 0.1;
pub const CONFIDENCE_CEILING: f64 = 0.98;

/// Access tier of an agent, controlling which clearances bootstrap may
/// grant: `proprietary` agents get the full ladder up to RED, `workspace`
/// agents stop at GREEN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTier {
    Proprietary,
    Workspace,
}

impl AgentTier {
    pub fn max_clearance(self) -> TlpLevel {
        match self {
            AgentTier::Proprietary => TlpLevel::Red,
            AgentTier::Workspace => TlpLevel::Green,
        }
    }
}

fn default_initial_confidence() -> f64 {
    0.5
}

fn default_validated_confidence() -> f64 {
    0.85
}

fn default_proven_confidence() -> f64 {
    0.95
}

fn default_completions_for_proven() -> u64 {
    20
}

fn default_mandatory_capabilities() -> Vec<String> {
    vec!["pattern_enforcement".to_string()]
}

fn default_fallback_capability() -> String {
    "code_review".to_string()
}

/// Bootstrap tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BootstrapConfig {
    #[serde(default = "default_initial_confidence")]
    pub initial_confidence: f64,
    #[serde(default = "default_validated_confidence")]
    pub validated_confidence: f64,
    #[serde(default = "default_proven_confidence")]
    pub proven_confidence: f64,
    #[serde(default = "default_completions_for_proven")]
    pub completions_for_proven: u64,
    /// Capabilities every bootstrapped agent carries unconditionally.
    #[serde(default = "default_mandatory_capabilities")]
    pub mandatory_capabilities: Vec<String>,
    /// Used when detection plus mandatory capabilities yield nothing.
    #[serde(default = "default_fallback_capability")]
    pub fallback_capability: String,
    #[serde(default)]
    pub detector: DetectorConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            initial_confidence: default_initial_confidence(),
            validated_confidence: default_validated_confidence(),
            proven_confidence: default_proven_confidence(),
            completions_for_proven: default_completions_for_proven(),
            mandatory_capabilities: default_mandatory_capabilities(),
            fallback_capability: default_fallback_capability(),
            detector: DetectorConfig::default(),
        }
    }
}

/// Output of one bootstrap run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapResult {
    pub manifest: AgentCapabilityManifest,
    pub detected_capabilities: Vec<DetectedCapability>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Generates an `AgentCapabilityManifest` from an agent definition.
#[derive(Debug, Clone, Default)]
pub struct CapabilityBootstrapper {
    config: BootstrapConfig,
    table: KeywordTable,
}

impl CapabilityBootstrapper {
    pub fn new(config: BootstrapConfig, table: KeywordTable) -> Self {
        Self { config, table }
    }

    pub fn bootstrap(&self, source: DefinitionSource, tier: AgentTier) -> Result<BootstrapResult> {
        let definition = parse_definition(source)?;
        self.bootstrap_definition(&definition, tier)
    }

    pub fn bootstrap_definition(
        &self,
        definition: &AgentDefinition,
        tier: AgentTier,
    ) -> Result<BootstrapResult> {
        let mut warnings = Vec::new();
        let mut suggestions = Vec::new();

        if definition.description.trim().is_empty() {
            warnings.push("definition has an empty description; detection is name-only".into());
        }

        let (mut detected, near_misses) =
            detect_capabilities(&self.config.detector, &self.table, definition);

        for miss in &near_misses {
            suggestions.push(format!(
                "capability '{}' matched only '{}'; declare it explicitly if intended",
                miss.capability_id,
                miss.matched_keywords.join(", "),
            ));
        }

        // Mandatory capabilities are included no matter what the text says.
        for mandatory in &self.config.mandatory_capabilities {
            if !detected.iter().any(|d| &d.capability_id == mandatory) {
                detected.push(DetectedCapability {
                    capability_id: mandatory.clone(),
                    detection_confidence: 0.0,
                    matched_keywords: Vec::new(),
                    keyword_hits: 0,
                    name_match: false,
                });
            }
        }

        if detected.is_empty() {
            warnings.push(format!(
                "no capabilities detected; falling back to '{}'",
                self.config.fallback_capability,
            ));
            detected.push(DetectedCapability {
                capability_id: self.config.fallback_capability.clone(),
                detection_confidence: 0.0,
                matched_keywords: Vec::new(),
                keyword_hits: 0,
                name_match: false,
            });
        }

        let validated: Vec<String> = definition
            .metadata
            .get("validated_capabilities")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        let completion_counts = definition
            .metadata
            .get("completion_counts")
            .and_then(|v| v.as_object());

        let clearance = tier.max_clearance();
        let capabilities: Vec<Capability> = detected
            .iter()
            .map(|d| {
                let completions = completion_counts
                    .and_then(|counts| counts.get(&d.capability_id))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                let confidence = self.initialize_confidence(
                    d,
                    validated.contains(&d.capability_id),
                    completions,
                    &mut warnings,
                );
                self.build_capability(d, confidence, completions, clearance)
            })
            .collect();

        let mut manifest = AgentCapabilityManifest::new(Uuid::new_v4(), &definition.name)
            .with_capabilities(capabilities);
        if let Some(max) = definition
            .metadata
            .get("max_concurrent_tasks")
            .and_then(|v| v.as_u64())
        {
            manifest.max_concurrent_tasks = max.max(1) as u32;
        }

        tracing::info!(
            agent = %definition.name,
            capabilities = manifest.capabilities.len(),
            tier = ?tier,
            "bootstrapped manifest",
        );

        Ok(BootstrapResult {
            manifest,
            detected_capabilities: detected,
            warnings,
            suggestions,
        })
    }

    /// Confidence ladder:
    /// - unvalidated: `0.7 * initial + 0.3 * detection`;
    /// - validated, no history: `validated_confidence`;
    /// - at or past `completions_for_proven`: `proven_confidence`;
    /// - in between: linear interpolation on completions.
    fn initialize_confidence(
        &self,
        detected: &DetectedCapability,
        validated: bool,
        completions: u64,
        warnings: &mut Vec<String>,
    ) -> f64 {
        let raw = if !validated {
            0.7 * self.config.initial_confidence + 0.3 * detected.detection_confidence
        } else if completions >= self.config.completions_for_proven {
            self.config.proven_confidence
        } else if completions == 0 {
            self.config.validated_confidence
        } else {
            let fraction = completions as f64 / self.config.completions_for_proven as f64;
            self.config.validated_confidence
                + (self.config.proven_confidence - self.config.validated_confidence) * fraction
        };

        if raw.is_nan() {
            warnings.push(format!(
                "capability '{}' produced a NaN confidence; clamped to {CONFIDENCE_FLOOR}",
                detected.capability_id,
            ));
            return CONFIDENCE_FLOOR;
        }
        if !(CONFIDENCE_FLOOR..=CONFIDENCE_CEILING).contains(&raw) {
            warnings.push(format!(
                "capability '{}' confidence {raw:.3} clamped to [{CONFIDENCE_FLOOR}, {CONFIDENCE_CEILING}]",
                detected.capability_id,
            ));
        }
        raw.clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING)
    }

    fn build_capability(
        &self,
        detected: &DetectedCapability,
        confidence: f64,
        completions: u64,
        clearance: TlpLevel,
    ) -> Capability {
        let entry = self.table.entry(&detected.capability_id);
        let mut capability = Capability::new(
            &detected.capability_id,
            entry
                .map(|e| e.display_name.clone())
                .unwrap_or_else(|| detected.capability_id.clone()),
        )
        .with_confidence(confidence)
        .with_clearance(clearance);
        if let Some(entry) = entry {
            capability.tags = vec![entry.category.clone()];
            capability.completion_time_estimate_ms = entry.completion_time_estimate_ms;
        }
        if completions > 0 {
            capability.successful_completions = Some(completions);
        }
        capability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bootstrapper() -> CapabilityBootstrapper {
        CapabilityBootstrapper::default()
    }

    fn definition(name: &str, description: &str) -> AgentDefinition {
        AgentDefinition {
            name: name.to_string(),
            description: description.to_string(),
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_bootstrap_detects_and_includes_mandatory() {
        let result = bootstrapper()
            .bootstrap_definition(
                &definition(
                    "doc-helper",
                    "maintains documentation, the readme, and the changelog",
                ),
                AgentTier::Workspace,
            )
            .unwrap();
        assert!(result.manifest.has_capability("documentation"));
        // pattern_enforcement rides along unconditionally.
        assert!(result.manifest.has_capability("pattern_enforcement"));
    }

    #[test]
    fn test_unvalidated_confidence_formula() {
        let result = bootstrapper()
            .bootstrap_definition(
                &definition("helper", "maintains documentation and the readme"),
                AgentTier::Workspace,
            )
            .unwrap();
        let detected = result
            .detected_capabilities
            .iter()
            .find(|d| d.capability_id == "documentation")
            .unwrap();
        let capability = result.manifest.capability("documentation").unwrap();
        let expected = 0.7 * 0.5 + 0.3 * detected.detection_confidence;
        assert!((capability.confidence_level - expected).abs() < 1e-9);
    }

    #[test]
    fn test_validated_and_proven_confidence() {
        let mut def = definition("helper", "maintains documentation and the readme");
        def.metadata.insert(
            "validated_capabilities".into(),
            serde_json::json!(["documentation"]),
        );

        // Validated, no history.
        let result = bootstrapper()
            .bootstrap_definition(&def, AgentTier::Workspace)
            .unwrap();
        let cap = result.manifest.capability("documentation").unwrap();
        assert!((cap.confidence_level - 0.85).abs() < 1e-9);

        // Proven.
        def.metadata.insert(
            "completion_counts".into(),
            serde_json::json!({"documentation": 20}),
        );
        let result = bootstrapper()
            .bootstrap_definition(&def, AgentTier::Workspace)
            .unwrap();
        let cap = result.manifest.capability("documentation").unwrap();
        assert!((cap.confidence_level - 0.95).abs() < 1e-9);
        assert_eq!(cap.successful_completions, Some(20));
    }

    #[test]
    fn test_interpolation_between_validated_and_proven() {
        let mut def = definition("helper", "maintains documentation and the readme");
        def.metadata.insert(
            "validated_capabilities".into(),
            serde_json::json!(["documentation"]),
        );
        def.metadata.insert(
            "completion_counts".into(),
            serde_json::json!({"documentation": 10}),
        );
        let result = bootstrapper()
            .bootstrap_definition(&def, AgentTier::Workspace)
            .unwrap();
        let cap = result.manifest.capability("documentation").unwrap();
        // Halfway between 0.85 and 0.95.
        assert!((cap.confidence_level - 0.90).abs() < 1e-9);
    }

    #[test]
    fn test_tier_controls_clearance() {
        let proprietary = bootstrapper()
            .bootstrap_definition(
                &definition("helper", "maintains documentation and the readme"),
                AgentTier::Proprietary,
            )
            .unwrap();
        assert!(proprietary
            .manifest
            .capabilities
            .iter()
            .all(|c| c.tlp_clearance == TlpLevel::Red));

        let workspace = bootstrapper()
            .bootstrap_definition(
                &definition("helper", "maintains documentation and the readme"),
                AgentTier::Workspace,
            )
            .unwrap();
        assert!(workspace
            .manifest
            .capabilities
            .iter()
            .all(|c| c.tlp_clearance == TlpLevel::Green));
        // Workspace tier never grants AMBER or RED.
        assert!(!workspace
            .manifest
            .max_clearance()
            .unwrap()
            .dominates(TlpLevel::Amber));
    }

    #[test]
    fn test_fallback_when_nothing_detected() {
        let config = BootstrapConfig {
            mandatory_capabilities: Vec::new(),
            ..Default::default()
        };
        let bootstrapper = CapabilityBootstrapper::new(config, KeywordTable::default());
        let result = bootstrapper
            .bootstrap_definition(&definition("opaque-agent", "???"), AgentTier::Workspace)
            .unwrap();
        assert!(result.manifest.has_capability("code_review"));
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("falling back")));
    }

    #[test]
    fn test_near_miss_becomes_suggestion() {
        let result = bootstrapper()
            .bootstrap_definition(
                &definition("helper", "occasionally updates the changelog"),
                AgentTier::Workspace,
            )
            .unwrap();
        assert!(result
            .suggestions
            .iter()
            .any(|s| s.contains("documentation")));
    }

    #[test]
    fn test_confidence_always_in_clamp_range() {
        let config = BootstrapConfig {
            initial_confidence: 5.0, // Degenerate configuration.
            ..Default::default()
        };
        let bootstrapper = CapabilityBootstrapper::new(config, KeywordTable::default());
        let result = bootstrapper
            .bootstrap_definition(
                &definition("helper", "maintains documentation and the readme"),
                AgentTier::Workspace,
            )
            .unwrap();
        for cap in &result.manifest.capabilities {
            assert!((CONFIDENCE_FLOOR..=CONFIDENCE_CEILING).contains(&cap.confidence_level));
        }
        assert!(result.warnings.iter().any(|w| w.contains("clamped")));
    }

    #[test]
    fn test_overall_confidence_is_mean() {
        let result = bootstrapper()
            .bootstrap_definition(
                &definition("helper", "maintains documentation and the readme"),
                AgentTier::Workspace,
            )
            .unwrap();
        let mean = result
            .manifest
            .capabilities
            .iter()
            .map(|c| c.confidence_level)
            .sum::<f64>()
            / result.manifest.capabilities.len() as f64;
        assert!((result.manifest.overall_confidence - mean).abs() < 1e-9);
    }
}
