//! Explicit configuration injected into every component at construction.
//!
//! Nothing here reads the environment. The binary resolves these values
//! from flags, env vars and the config file, then hands them down.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::condition::Condition;
use crate::pipeline::Stage;
use crate::provider::RequestFormat;

/// Errors raised by [`NutriSettings::validate`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("connect timeout {connect:?} must be shorter than request timeout {request:?}")]
    ConnectTimeoutNotShorter { connect: Duration, request: Duration },

    #[error("empty URL for {0}")]
    EmptyUrl(String),

    #[error("token budget for {0} must be positive")]
    ZeroTokenBudget(Condition),

    #[error("max_sentences must be positive")]
    ZeroSentences,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

// ---------------------------------------------------------------------------
// Stage services
// ---------------------------------------------------------------------------

/// Base URLs of the five stage services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageEndpoints {
    pub diet_rules: String,
    pub gaps: String,
    pub targets: String,
    pub conflicts: String,
    pub plan: String,
}

impl StageEndpoints {
    /// Point every stage at the same base URL (single gateway or test stub).
    pub fn uniform(base_url: impl Into<String>) -> Self {
        let base = base_url.into();
        Self {
            diet_rules: base.clone(),
            gaps: base.clone(),
            targets: base.clone(),
            conflicts: base.clone(),
            plan: base,
        }
    }

    /// Base URL configured for `stage`.
    pub fn base_url(&self, stage: Stage) -> &str {
        match stage {
            Stage::DietRules => &self.diet_rules,
            Stage::Gaps => &self.gaps,
            Stage::Targets => &self.targets,
            Stage::Conflicts => &self.conflicts,
            Stage::Plan => &self.plan,
        }
    }

    /// Full URL for `stage`: base URL plus the stage path.
    pub fn url_for(&self, stage: Stage) -> String {
        format!(
            "{}{}",
            self.base_url(stage).trim_end_matches('/'),
            stage.path()
        )
    }
}

impl Default for StageEndpoints {
    fn default() -> Self {
        Self {
            diet_rules: "http://a1:9001".to_owned(),
            gaps: "http://a2:9002".to_owned(),
            targets: "http://a3:9003".to_owned(),
            conflicts: "http://a4:9004".to_owned(),
            plan: "http://a5:9005".to_owned(),
        }
    }
}

/// Timeouts applied to every stage call.
///
/// The connect timeout must be strictly shorter than the overall request
/// timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            request: Duration::from_secs(15),
        }
    }
}

/// How stages 1-4 are scheduled. Stage 5 always waits for all four.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PipelineMode {
    /// One stage at a time, in order. Fails fast on the first error.
    #[default]
    Sequential,
    /// Stages 1-4 in parallel; the first error still aborts the run.
    Concurrent,
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sequential => "sequential",
            Self::Concurrent => "concurrent",
        };
        f.write_str(s)
    }
}

impl FromStr for PipelineMode {
    type Err = PipelineModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Self::Sequential),
            "concurrent" => Ok(Self::Concurrent),
            other => Err(PipelineModeParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PipelineMode`] string.
#[derive(Debug, Clone)]
pub struct PipelineModeParseError(pub String);

impl fmt::Display for PipelineModeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid pipeline mode: {:?}", self.0)
    }
}

impl std::error::Error for PipelineModeParseError {}

// ---------------------------------------------------------------------------
// Specialists
// ---------------------------------------------------------------------------

/// Where a condition's generation provider lives and how much it may say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialistSettings {
    /// Full URL of the provider endpoint.
    pub url: String,
    pub max_new_tokens: u32,
    pub timeout: Duration,
    pub format: RequestFormat,
}

impl SpecialistSettings {
    /// Defaults for `condition`.
    ///
    /// | condition    | tokens | timeout |
    /// |--------------|--------|---------|
    /// | diabetes     | 160    | 60s     |
    /// | hypertension | 256    | 60s     |
    /// | kidney       | 200    | 60s     |
    /// | lipids       | 200    | 15s     |
    /// | general      | 120    | 60s     |
    ///
    /// Lipids points at the dedicated planner and speaks
    /// [`RequestFormat::LipidsPlan`]; every other condition uses `/generate`.
    pub fn default_for(condition: Condition) -> Self {
        let (url, max_new_tokens, timeout_secs) = match condition {
            Condition::Diabetes => ("http://localhost:8080/generate", 160, 60),
            Condition::Hypertension => ("http://localhost:8082/generate", 256, 60),
            Condition::Kidney => ("http://localhost:9008/generate", 200, 60),
            Condition::Lipids => ("http://localhost:9006/v1/lipids/plan", 200, 15),
            Condition::General => ("http://localhost:8090/generate", 120, 60),
        };
        let format = match condition {
            Condition::Lipids => RequestFormat::LipidsPlan,
            _ => RequestFormat::Generate,
        };
        Self {
            url: url.to_owned(),
            max_new_tokens,
            timeout: Duration::from_secs(timeout_secs),
            format,
        }
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Knobs for the local [`crate::generation::GenerationEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSettings {
    /// Sentences kept by cleanup.
    pub max_sentences: usize,
    /// Budget applied when a request does not carry one.
    pub default_max_new_tokens: u32,
    /// Appended to every prompt before encoding.
    pub answer_suffix: Option<String>,
}

impl GenerationSettings {
    pub const DEFAULT_ANSWER_SUFFIX: &str = "\n\nAnswer in 4-6 concise bullet points. \
         Avoid repeating the same phrase multiple times.";
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_sentences: 6,
            default_max_new_tokens: 64,
            answer_suffix: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// Everything the core needs, resolved once by the caller.
#[derive(Debug, Clone)]
pub struct NutriSettings {
    pub stages: StageEndpoints,
    pub stage_timeouts: StageTimeouts,
    pub pipeline_mode: PipelineMode,
    pub specialists: HashMap<Condition, SpecialistSettings>,
    pub generation: GenerationSettings,
}

impl NutriSettings {
    /// Settings for `condition`, falling back to its defaults when absent.
    pub fn specialist(&self, condition: Condition) -> SpecialistSettings {
        self.specialists
            .get(&condition)
            .cloned()
            .unwrap_or_else(|| SpecialistSettings::default_for(condition))
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stage_timeouts.connect >= self.stage_timeouts.request {
            return Err(ConfigError::ConnectTimeoutNotShorter {
                connect: self.stage_timeouts.connect,
                request: self.stage_timeouts.request,
            });
        }

        for stage in Stage::ALL {
            if self.stages.base_url(stage).trim().is_empty() {
                return Err(ConfigError::EmptyUrl(format!("stage {stage}")));
            }
        }

        for condition in Condition::ALL {
            let settings = self.specialist(condition);
            if settings.url.trim().is_empty() {
                return Err(ConfigError::EmptyUrl(format!("specialist {condition}")));
            }
            if settings.max_new_tokens == 0 {
                return Err(ConfigError::ZeroTokenBudget(condition));
            }
        }

        if self.generation.max_sentences == 0 {
            return Err(ConfigError::ZeroSentences);
        }

        Ok(())
    }
}

impl Default for NutriSettings {
    fn default() -> Self {
        let specialists = Condition::ALL
            .into_iter()
            .map(|c| (c, SpecialistSettings::default_for(c)))
            .collect();
        Self {
            stages: StageEndpoints::default(),
            stage_timeouts: StageTimeouts::default(),
            pipeline_mode: PipelineMode::default(),
            specialists,
            generation: GenerationSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        NutriSettings::default().validate().unwrap();
    }

    #[test]
    fn default_token_budgets() {
        assert_eq!(
            SpecialistSettings::default_for(Condition::Diabetes).max_new_tokens,
            160
        );
        assert_eq!(
            SpecialistSettings::default_for(Condition::Hypertension).max_new_tokens,
            256
        );
    }

    #[test]
    fn only_lipids_uses_planner_format() {
        for condition in Condition::ALL {
            let expected = if condition == Condition::Lipids {
                RequestFormat::LipidsPlan
            } else {
                RequestFormat::Generate
            };
            assert_eq!(SpecialistSettings::default_for(condition).format, expected);
        }
    }

    #[test]
    fn url_for_appends_stage_path() {
        let endpoints = StageEndpoints::uniform("http://127.0.0.1:4000/");
        assert_eq!(
            endpoints.url_for(Stage::DietRules),
            "http://127.0.0.1:4000/diet-rules"
        );
        assert_eq!(endpoints.url_for(Stage::Plan), "http://127.0.0.1:4000/plan");
    }

    #[test]
    fn connect_timeout_must_be_shorter() {
        let mut settings = NutriSettings::default();
        settings.stage_timeouts = StageTimeouts {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(15),
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ConnectTimeoutNotShorter { .. })
        ));
    }

    #[test]
    fn zero_budget_rejected() {
        let mut settings = NutriSettings::default();
        settings
            .specialists
            .get_mut(&Condition::Kidney)
            .unwrap()
            .max_new_tokens = 0;
        assert_eq!(
            settings.validate(),
            Err(ConfigError::ZeroTokenBudget(Condition::Kidney))
        );
    }

    #[test]
    fn pipeline_mode_parses() {
        assert_eq!("concurrent".parse::<PipelineMode>().unwrap(), PipelineMode::Concurrent);
        assert_eq!(PipelineMode::default().to_string(), "sequential");
        let err = "parallel".parse::<PipelineMode>().unwrap_err();
        assert_eq!(err.to_string(), "invalid pipeline mode: \"parallel\"");
    }

    #[test]
    fn missing_specialist_falls_back_to_default() {
        let mut settings = NutriSettings::default();
        settings.specialists.remove(&Condition::Lipids);
        assert_eq!(
            settings.specialist(Condition::Lipids),
            SpecialistSettings::default_for(Condition::Lipids)
        );
    }
}
