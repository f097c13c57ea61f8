use serde::{Deserialize, Serialize};

/// Ordered risk label attached to every planned `Instruction`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!(
                "invalid risk level '{other}'. Valid values: safe, low, medium, high"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_ordering() {
        assert!(RiskLevel::Safe < RiskLevel::Low);
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
    }

    #[test]
    fn test_from_str_roundtrip() {
        for level in [
            RiskLevel::Safe,
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
        ] {
            let parsed = RiskLevel::from_str(level.as_str()).unwrap();
            assert_eq!(parsed, level);
        }
    }

    #[test]
    fn test_from_str_invalid() {
        assert!(RiskLevel::from_str("extreme").is_err());
    }

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!(RiskLevel::from_str("HIGH").unwrap(), RiskLevel::High);
    }

    #[test]
    fn test_display() {
        assert_eq!(RiskLevel::Medium.to_string(), "medium");
    }
}
