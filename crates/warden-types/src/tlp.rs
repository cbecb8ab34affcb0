use serde::{Deserialize, Serialize};

/// Traffic-light-protocol sensitivity labels, least to most restrictive.
///
/// The derived `Ord` follows declaration order, so `Clear < Green < Amber < Red`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TlpLevel {
    Clear,
    Green,
    Amber,
    Red,
}

impl TlpLevel {
    /// Whether this clearance is sufficient for work at `required`.
    /// Dominance is reflexive: an agent at RED may take CLEAR work.
    pub fn dominates(self, required: TlpLevel) -> bool {
        self >= required
    }

    /// Numeric rank used by anomaly baselines (CLEAR=0 .. RED=3).
    pub fn rank(self) -> u8 {
        match self {
            TlpLevel::Clear => 0,
            TlpLevel::Green => 1,
            TlpLevel::Amber => 2,
            TlpLevel::Red => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TlpLevel::Clear => "CLEAR",
            TlpLevel::Green => "GREEN",
            TlpLevel::Amber => "AMBER",
            TlpLevel::Red => "RED",
        }
    }
}

impl std::fmt::Display for TlpLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TlpLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CLEAR" => Ok(TlpLevel::Clear),
            "GREEN" => Ok(TlpLevel::Green),
            "AMBER" => Ok(TlpLevel::Amber),
            "RED" => Ok(TlpLevel::Red),
            other => Err(format!("unknown TLP level: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tlp_ordering() {
        assert!(TlpLevel::Clear < TlpLevel::Green);
        assert!(TlpLevel::Green < TlpLevel::Amber);
        assert!(TlpLevel::Amber < TlpLevel::Red);
    }

    #[test]
    fn test_dominance_is_reflexive() {
        for level in [
            TlpLevel::Clear,
            TlpLevel::Green,
            TlpLevel::Amber,
            TlpLevel::Red,
        ] {
            assert!(level.dominates(level));
        }
    }

    #[test]
    fn test_red_dominates_clear() {
        assert!(TlpLevel::Red.dominates(TlpLevel::Clear));
        assert!(!TlpLevel::Clear.dominates(TlpLevel::Amber));
    }

    #[test]
    fn test_serde_uppercase() {
        let json = serde_json::to_string(&TlpLevel::Amber).unwrap();
        assert_eq!(json, "\"AMBER\"");
        let back: TlpLevel = serde_json::from_str("\"RED\"").unwrap();
        assert_eq!(back, TlpLevel::Red);
    }

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!("amber".parse::<TlpLevel>().unwrap(), TlpLevel::Amber);
        assert!("ULTRAVIOLET".parse::<TlpLevel>().is_err());
    }
}
