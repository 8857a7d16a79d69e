use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The specialist a free-text request is routed to.
///
/// This is the routing decision produced by [`crate::router::classify`]. It
/// has no lifecycle of its own: it is computed and consumed within a single
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Diabetes,
    Hypertension,
    Kidney,
    Lipids,
    General,
}

impl Condition {
    /// Every condition, specialists first, `General` last.
    pub const ALL: [Condition; 5] = [
        Self::Diabetes,
        Self::Hypertension,
        Self::Kidney,
        Self::Lipids,
        Self::General,
    ];

    /// Stable lowercase identifier (`"diabetes"`, `"general"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Diabetes => "diabetes",
            Self::Hypertension => "hypertension",
            Self::Kidney => "kidney",
            Self::Lipids => "lipids",
            Self::General => "general",
        }
    }

    /// Human-facing label used in sentinel text, e.g. `"Hypertension"`.
    pub fn label(self) -> &'static str {
        match self {
            Self::Diabetes => "Diabetes",
            Self::Hypertension => "Hypertension",
            Self::Kidney => "Kidney",
            Self::Lipids => "Lipids",
            Self::General => "General",
        }
    }

    /// `true` for every condition except [`Condition::General`].
    pub fn is_specialized(self) -> bool {
        self != Self::General
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = ConditionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "diabetes" => Ok(Self::Diabetes),
            "hypertension" => Ok(Self::Hypertension),
            "kidney" => Ok(Self::Kidney),
            "lipids" => Ok(Self::Lipids),
            "general" => Ok(Self::General),
            other => Err(ConditionParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Condition`] string.
#[derive(Debug, Clone)]
pub struct ConditionParseError(pub String);

impl fmt::Display for ConditionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid condition: {:?}", self.0)
    }
}

impl std::error::Error for ConditionParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_parse_agree() {
        for condition in Condition::ALL {
            let parsed: Condition = condition.to_string().parse().unwrap();
            assert_eq!(parsed, condition);
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        let err = "cardiology".parse::<Condition>().unwrap_err();
        assert_eq!(err.to_string(), "invalid condition: \"cardiology\"");
    }

    #[test]
    fn only_general_is_unspecialized() {
        let unspecialized: Vec<_> = Condition::ALL
            .into_iter()
            .filter(|c| !c.is_specialized())
            .collect();
        assert_eq!(unspecialized, vec![Condition::General]);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Condition::Hypertension).unwrap();
        assert_eq!(json, "\"hypertension\"");
    }
}
