use serde::{Deserialize, Serialize};

/// One row of the keyword table: a capability and the phrases that signal
/// it in an agent description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityKeywords {
    pub capability_id: String,
    pub display_name: String,
    pub keywords: Vec<String>,
    pub category: String,
    /// Typical completion time used to seed the manifest.
    #[serde(default = "default_completion_time_ms")]
    pub completion_time_estimate_ms: u64,
}

fn default_completion_time_ms() -> u64 {
    120_000
}

/// The detection dictionary. The entries ship as defaults; deployments
/// replace or extend them through configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordTable {
    pub entries: Vec<CapabilityKeywords>,
}

impl Default for KeywordTable {
    fn default() -> Self {
        let row = |id: &str, name: &str, category: &str, keywords: &[&str]| CapabilityKeywords {
            capability_id: id.to_string(),
            display_name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            category: category.to_string(),
            completion_time_estimate_ms: default_completion_time_ms(),
        };
        Self {
            entries: vec![
                row(
                    "code_review",
                    "Code Review",
                    "quality",
                    &["review", "code review", "pull request", "lint", "diff"],
                ),
                row(
                    "documentation",
                    "Documentation",
                    "authoring",
                    &["documentation", "docs", "readme", "changelog", "write"],
                ),
                row(
                    "content_search",
                    "Content Search",
                    "discovery",
                    &["search", "find", "query", "index", "lookup"],
                ),
                row(
                    "design_tokens",
                    "Design Token Scanning",
                    "design",
                    &["design token", "stylesheet", "css", "theme", "palette"],
                ),
                row(
                    "testing",
                    "Testing",
                    "quality",
                    &["test", "coverage", "regression", "assert", "fixture"],
                ),
                row(
                    "refactoring",
                    "Refactoring",
                    "maintenance",
                    &["refactor", "cleanup", "restructure", "simplify", "migrate"],
                ),
                row(
                    "pattern_enforcement",
                    "Pattern Enforcement",
                    "governance",
                    &["pattern", "convention", "style guide", "enforce", "policy"],
                ),
            ],
        }
    }
}

impl KeywordTable {
    pub fn entry(&self, capability_id: &str) -> Option<&CapabilityKeywords> {
        self.entries
            .iter()
            .find(|e| e.capability_id == capability_id)
    }
}
