//! Plan assembly: five stage services driven in a fixed order.
//!
//! ```text
//! Profile --> diet-rules --> gaps --> targets --> conflicts --> plan --> Plan
//!   (full profile)  ({patient_id} for 2-4)          (all four artifacts)
//! ```
//!
//! Each case moves through [`CaseState`]; the first stage error aborts the
//! run and is reported as a [`PipelineFailure`] naming the stage.

pub mod artifacts;
pub mod client;
pub mod runner;
pub mod state;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use artifacts::{
    Conflicts, DietRuleSet, DietRules, Gaps, Plan, Profile, SCHEMA_VERSION, Targets, schema_names,
};
pub use client::{HttpStageClient, StageClient};
pub use runner::{CaseReport, PlanPipeline, StageRecord};
pub use state::CaseState;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// One of the five stage services, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    DietRules,
    Gaps,
    Targets,
    Conflicts,
    Plan,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Self::DietRules,
        Self::Gaps,
        Self::Targets,
        Self::Conflicts,
        Self::Plan,
    ];

    /// 1-based position in the pipeline.
    pub fn number(self) -> u8 {
        match self {
            Self::DietRules => 1,
            Self::Gaps => 2,
            Self::Targets => 3,
            Self::Conflicts => 4,
            Self::Plan => 5,
        }
    }

    /// Request path on the stage service.
    pub fn path(self) -> &'static str {
        match self {
            Self::DietRules => "/diet-rules",
            Self::Gaps => "/gaps",
            Self::Targets => "/targets",
            Self::Conflicts => "/conflicts",
            Self::Plan => "/plan",
        }
    }

    /// Schema name of the artifact this stage returns.
    pub fn schema(self) -> &'static str {
        match self {
            Self::DietRules => "DietRules.v1",
            Self::Gaps => "Gaps.v1",
            Self::Targets => "Targets.v1",
            Self::Conflicts => "Conflicts.v1",
            Self::Plan => "Plan.v1",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DietRules => "diet-rules",
            Self::Gaps => "gaps",
            Self::Targets => "targets",
            Self::Conflicts => "conflicts",
            Self::Plan => "plan",
        };
        f.write_str(s)
    }
}

impl FromStr for Stage {
    type Err = StageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "diet-rules" => Ok(Self::DietRules),
            "gaps" => Ok(Self::Gaps),
            "targets" => Ok(Self::Targets),
            "conflicts" => Ok(Self::Conflicts),
            "plan" => Ok(Self::Plan),
            other => Err(StageParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Stage`] string.
#[derive(Debug, Clone)]
pub struct StageParseError(pub String);

impl fmt::Display for StageParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid stage: {:?}", self.0)
    }
}

impl std::error::Error for StageParseError {}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a single stage call failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error("stage service unreachable: {0}")]
    Unreachable(String),

    #[error("stage service returned HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("stage call timed out")]
    Timeout,

    #[error("patient_id mismatch: expected {expected:?}, got {got:?}")]
    Mismatch {
        expected: String,
        got: Option<String>,
    },

    #[error("malformed artifact: {0}")]
    Malformed(String),

    #[error("stage call cancelled")]
    Cancelled,
}

/// The terminal failure of a case: which stage broke and why.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("pipeline failed at stage {stage}: {cause}")]
pub struct PipelineFailure {
    pub stage: Stage,
    #[source]
    pub cause: StageError,
}

impl PipelineFailure {
    pub fn new(stage: Stage, cause: StageError) -> Self {
        Self { stage, cause }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_display_roundtrip() {
        for stage in Stage::ALL {
            let parsed: Stage = stage.to_string().parse().unwrap();
            assert_eq!(parsed, stage);
        }
        assert!("nutrients".parse::<Stage>().is_err());
    }

    #[test]
    fn stage_numbers_follow_order() {
        let numbers: Vec<u8> = Stage::ALL.iter().map(|s| s.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn stage_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(Stage::DietRules).unwrap(),
            serde_json::json!("diet-rules")
        );
    }

    #[test]
    fn failure_names_stage() {
        let failure = PipelineFailure::new(Stage::Targets, StageError::Timeout);
        assert_eq!(
            failure.to_string(),
            "pipeline failed at stage targets: stage call timed out"
        );
    }
}
