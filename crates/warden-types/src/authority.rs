use serde::{Deserialize, Serialize};

/// Human-authority levels, least to most powerful. Derived `Ord` follows
/// declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityLevel {
    Agent,
    Supervisor,
    Manager,
    Executive,
    Emergency,
}

impl AuthorityLevel {
    pub fn dominates(self, required: AuthorityLevel) -> bool {
        self >= required
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AuthorityLevel::Agent => "agent",
            AuthorityLevel::Supervisor => "supervisor",
            AuthorityLevel::Manager => "manager",
            AuthorityLevel::Executive => "executive",
            AuthorityLevel::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for AuthorityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much liability the delegator retains for the delegated work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiabilityLevel {
    None,
    Limited,
    Shared,
    Full,
}

impl LiabilityLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LiabilityLevel::None => "none",
            LiabilityLevel::Limited => "limited",
            LiabilityLevel::Shared => "shared",
            LiabilityLevel::Full => "full",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authority_ordering() {
        assert!(AuthorityLevel::Agent < AuthorityLevel::Supervisor);
        assert!(AuthorityLevel::Manager < AuthorityLevel::Executive);
        assert!(AuthorityLevel::Executive < AuthorityLevel::Emergency);
        assert!(AuthorityLevel::Emergency.dominates(AuthorityLevel::Manager));
        assert!(!AuthorityLevel::Supervisor.dominates(AuthorityLevel::Manager));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&AuthorityLevel::Executive).unwrap(),
            "\"executive\"",
        );
        assert_eq!(
            serde_json::to_string(&LiabilityLevel::Full).unwrap(),
            "\"full\"",
        );
    }
}
