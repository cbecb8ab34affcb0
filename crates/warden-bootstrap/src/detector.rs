use serde::{Deserialize, Serialize};

use crate::keywords::{CapabilityKeywords, KeywordTable};
use crate::parser::AgentDefinition;

/// Fixed confidence assigned when an agent's name syntactically names a
/// capability.
pub const NAME_MATCH_CONFIDENCE: f64 = 0.75;

/// One detection hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedCapability {
    pub capability_id: String,
    pub detection_confidence: f64,
    pub matched_keywords: Vec<String>,
    pub keyword_hits: usize,
    pub name_match: bool,
}

/// Detection tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectorConfig {
    /// Keyword hits needed for inclusion without a name match.
    #[serde(default = "default_minimum_keyword_matches")]
    pub minimum_keyword_matches: usize,
    /// `contains` matching instead of word-boundary matching.
    #[serde(default = "default_fuzzy_matching")]
    pub fuzzy_matching: bool,
}

fn default_minimum_keyword_matches() -> usize {
    2
}

fn default_fuzzy_matching() -> bool {
    true
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            minimum_keyword_matches: default_minimum_keyword_matches(),
            fuzzy_matching: default_fuzzy_matching(),
        }
    }
}

/// Run keyword detection over an agent definition. Returns both included
/// capabilities and near misses (single hit, no name match) so the caller
/// can surface suggestions.
pub fn detect_capabilities(
    config: &DetectorConfig,
    table: &KeywordTable,
    definition: &AgentDefinition,
) -> (Vec<DetectedCapability>, Vec<DetectedCapability>) {
    let haystack = format!("{} {}", definition.name, definition.description).to_lowercase();
    let name_lowered = definition.name.to_lowercase();

    let mut included = Vec::new();
    let mut near_misses = Vec::new();

    for entry in &table.entries {
        let matched: Vec<String> = entry
            .keywords
            .iter()
            .filter(|kw| keyword_hits(&haystack, &kw.to_lowercase(), config.fuzzy_matching))
            .cloned()
            .collect();
        let hits = matched.len();
        let name_match = name_contains_capability(&name_lowered, &entry.capability_id);

        let detection = DetectedCapability {
            capability_id: entry.capability_id.clone(),
            detection_confidence: if name_match && hits >= 1 {
                NAME_MATCH_CONFIDENCE
            } else {
                detection_confidence(entry, hits)
            },
            matched_keywords: matched,
            keyword_hits: hits,
            name_match,
        };

        if hits >= config.minimum_keyword_matches || (hits >= 1 && name_match) {
            included.push(detection);
        } else if hits >= 1 {
            near_misses.push(detection);
        }
    }

    (included, near_misses)
}

/// Fraction of the capability's keyword list observed in the text.
fn detection_confidence(entry: &CapabilityKeywords, hits: usize) -> f64 {
    if entry.keywords.is_empty() {
        return 0.0;
    }
    (hits as f64 / entry.keywords.len() as f64).clamp(0.0, 1.0)
}

fn keyword_hits(haystack: &str, keyword: &str, fuzzy: bool) -> bool {
    if fuzzy {
        haystack.contains(keyword)
    } else {
        word_boundary_match(haystack, keyword)
    }
}

/// Non-fuzzy matching requires the keyword to sit on word boundaries.
fn word_boundary_match(haystack: &str, keyword: &str) -> bool {
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(keyword) {
        let begin = start + pos;
        let end = begin + keyword.len();
        let boundary_before = begin == 0
            || !haystack[..begin]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let boundary_after = end == haystack.len()
            || !haystack[end..]
                .chars()
                .next()
                .is_some_and(|c| c.is_alphanumeric());
        if boundary_before && boundary_after {
            return true;
        }
        start = begin + 1;
    }
    false
}

/// The agent name "contains" a capability when the id appears in slug
/// (`code_review`) or dashed (`code-review`) form.
fn name_contains_capability(name_lowered: &str, capability_id: &str) -> bool {
    let slug = capability_id.to_lowercase();
    let dashed = slug.replace('_', "-");
    name_lowered.contains(&slug) || name_lowered.contains(&dashed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(name: &str, description: &str) -> AgentDefinition {
        AgentDefinition {
            name: name.to_string(),
            description: description.to_string(),
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_two_hits_included() {
        let (included, _) = detect_capabilities(
            &DetectorConfig::default(),
            &KeywordTable::default(),
            &definition("helper", "runs tests and tracks coverage for regressions"),
        );
        let testing = included
            .iter()
            .find(|d| d.capability_id == "testing")
            .unwrap();
        assert!(testing.keyword_hits >= 2);
        assert!(!testing.name_match);
    }

    #[test]
    fn test_single_hit_is_near_miss() {
        let (included, near) = detect_capabilities(
            &DetectorConfig::default(),
            &KeywordTable::default(),
            &definition("helper", "occasionally updates the changelog"),
        );
        assert!(included.iter().all(|d| d.capability_id != "documentation"));
        assert!(near.iter().any(|d| d.capability_id == "documentation"));
    }

    #[test]
    fn test_name_match_promotes_single_hit() {
        let (included, _) = detect_capabilities(
            &DetectorConfig::default(),
            &KeywordTable::default(),
            &definition("code-review-bot", "handles the review queue"),
        );
        let cr = included
            .iter()
            .find(|d| d.capability_id == "code_review")
            .unwrap();
        assert!(cr.name_match);
        assert!((cr.detection_confidence - NAME_MATCH_CONFIDENCE).abs() < 1e-9);
    }

    #[test]
    fn test_slug_form_name_match() {
        let (included, _) = detect_capabilities(
            &DetectorConfig::default(),
            &KeywordTable::default(),
            &definition("content_search_v2", "can search things"),
        );
        assert!(included.iter().any(|d| d.capability_id == "content_search"));
    }

    #[test]
    fn test_word_boundary_matching() {
        assert!(word_boundary_match("run the test suite", "test"));
        assert!(!word_boundary_match("latest changes", "test"));
        assert!(word_boundary_match("test", "test"));
        assert!(word_boundary_match("a code review queue", "code review"));
    }

    #[test]
    fn test_non_fuzzy_rejects_substrings() {
        let config = DetectorConfig {
            fuzzy_matching: false,
            ..Default::default()
        };
        // "latest" and "attestation" contain "test" only as substrings.
        let (included, near) = detect_capabilities(
            &config,
            &KeywordTable::default(),
            &definition("helper", "latest attestation protocol"),
        );
        assert!(included.iter().all(|d| d.capability_id != "testing"));
        assert!(near.iter().all(|d| d.capability_id != "testing"));
    }

    #[test]
    fn test_detection_is_case_insensitive() {
        let (included, _) = detect_capabilities(
            &DetectorConfig::default(),
            &KeywordTable::default(),
            &definition("Helper", "REVIEW the Pull Request backlog"),
        );
        assert!(included.iter().any(|d| d.capability_id == "code_review"));
    }
}
