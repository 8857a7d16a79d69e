//! Case lifecycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Stage;

/// Where a case is in the pipeline.
///
/// Valid transitions:
///
/// ```text
/// submitted      -> rules_ready
/// rules_ready    -> gaps_ready
/// gaps_ready     -> targets_ready
/// targets_ready  -> conflicts_ready
/// conflicts_ready -> plan_ready
/// (any non-terminal) -> failed
/// ```
///
/// `plan_ready` and `failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CaseState {
    Submitted,
    RulesReady,
    GapsReady,
    TargetsReady,
    ConflictsReady,
    PlanReady,
    Failed { stage: Stage },
}

impl CaseState {
    /// State reached once `stage` has produced its artifact.
    pub fn after(stage: Stage) -> Self {
        match stage {
            Stage::DietRules => Self::RulesReady,
            Stage::Gaps => Self::GapsReady,
            Stage::Targets => Self::TargetsReady,
            Stage::Conflicts => Self::ConflictsReady,
            Stage::Plan => Self::PlanReady,
        }
    }

    /// The stage that runs next, or `None` in a terminal state.
    pub fn next_stage(self) -> Option<Stage> {
        match self {
            Self::Submitted => Some(Stage::DietRules),
            Self::RulesReady => Some(Stage::Gaps),
            Self::GapsReady => Some(Stage::Targets),
            Self::TargetsReady => Some(Stage::Conflicts),
            Self::ConflictsReady => Some(Stage::Plan),
            Self::PlanReady | Self::Failed { .. } => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::PlanReady | Self::Failed { .. })
    }

    /// Check whether `self -> to` is an edge in the case graph.
    pub fn can_transition_to(self, to: CaseState) -> bool {
        match to {
            Self::Failed { .. } => !self.is_terminal(),
            _ => matches!(
                (self, to),
                (Self::Submitted, Self::RulesReady)
                    | (Self::RulesReady, Self::GapsReady)
                    | (Self::GapsReady, Self::TargetsReady)
                    | (Self::TargetsReady, Self::ConflictsReady)
                    | (Self::ConflictsReady, Self::PlanReady)
            ),
        }
    }
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submitted => f.write_str("submitted"),
            Self::RulesReady => f.write_str("rules_ready"),
            Self::GapsReady => f.write_str("gaps_ready"),
            Self::TargetsReady => f.write_str("targets_ready"),
            Self::ConflictsReady => f.write_str("conflicts_ready"),
            Self::PlanReady => f.write_str("plan_ready"),
            Self::Failed { stage } => write!(f, "failed at {stage}"),
        }
    }
}
