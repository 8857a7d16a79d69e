//! Intent routing for free-text requests.
//!
//! Each specialist owns a matcher over a fixed vocabulary. The router
//! evaluates them top to bottom in a single documented order and returns the
//! first condition that fires:
//!
//! ```text
//! kidney > hypertension > lipids > diabetes > general
//! ```
//!
//! Routing is a pure function of the text. It never errors and performs no
//! I/O; empty input routes to [`Condition::General`].

use std::sync::LazyLock;

use regex::Regex;

use crate::condition::Condition;

const HYPERTENSION_KEYWORDS: &[&str] = &[
    "hypertension",
    "high blood pressure",
    "blood pressure",
    "bp ",
    " bp",
    "high bp",
    "htn",
    "systolic",
    "diastolic",
    "dash diet",
    "dash-style",
    "salt restriction",
];

const DIABETES_KEYWORDS: &[&str] = &[
    "diabetes",
    "diabetic",
    "blood sugar",
    "glucose",
    "hba1c",
    "t2dm",
    "type 2",
    "type-2",
    "insulin",
    "metformin",
];

const KIDNEY_PATTERN: &str = r"(?i)\b(ckd|chronic kidney|kidney disease|kidney|renal|egfr|creatinine|dialysis|nephro|proteinuria|potassium|phosphorus|fluid restriction)\b";

const LIPIDS_PATTERN: &str = r"(?i)\b(ldl|hdl|triglyceride|triglycerides|cholesterol|lipid profile|dyslipidemia|hyperlipidemia)\b";

static STANDARD: LazyLock<IntentRouter> = LazyLock::new(IntentRouter::standard);

/// A single specialist's vocabulary test.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Fires when any keyword is a substring of the lowercased text.
    Keywords(&'static [&'static str]),
    /// Fires when the (case-insensitive) pattern matches anywhere.
    Pattern(Regex),
}

impl Matcher {
    fn is_match(&self, text: &str, lowered: &str) -> bool {
        match self {
            Self::Keywords(keywords) => keywords.iter().any(|k| lowered.contains(k)),
            Self::Pattern(re) => re.is_match(text),
        }
    }
}

/// An ordered list of `(condition, matcher)` rules.
#[derive(Debug, Clone)]
pub struct IntentRouter {
    rules: Vec<(Condition, Matcher)>,
}

impl IntentRouter {
    /// Build a router from explicit rules, evaluated in the given order.
    pub fn new(rules: Vec<(Condition, Matcher)>) -> Self {
        Self { rules }
    }

    /// The production vocabulary in the documented precedence order.
    pub fn standard() -> Self {
        Self::new(vec![
            (Condition::Kidney, Matcher::Pattern(static_regex(KIDNEY_PATTERN))),
            (
                Condition::Hypertension,
                Matcher::Keywords(HYPERTENSION_KEYWORDS),
            ),
            (Condition::Lipids, Matcher::Pattern(static_regex(LIPIDS_PATTERN))),
            (Condition::Diabetes, Matcher::Keywords(DIABETES_KEYWORDS)),
        ])
    }

    /// Conditions in evaluation order (without the `General` fallback).
    pub fn precedence(&self) -> Vec<Condition> {
        self.rules.iter().map(|(c, _)| *c).collect()
    }

    /// Route `text` to exactly one condition.
    pub fn classify(&self, text: &str) -> Condition {
        self.matches(text)
            .into_iter()
            .next()
            .unwrap_or(Condition::General)
    }

    /// Every condition whose matcher fires, in precedence order.
    pub fn matches(&self, text: &str) -> Vec<Condition> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        let lowered = text.to_lowercase();
        self.rules
            .iter()
            .filter(|(_, m)| m.is_match(text, &lowered))
            .map(|(c, _)| *c)
            .collect()
    }
}

impl Default for IntentRouter {
    fn default() -> Self {
        Self::standard()
    }
}

/// Route `text` with the standard vocabulary.
pub fn classify(text: &str) -> Condition {
    STANDARD.classify(text)
}

/// Like [`classify`], for optional input.
pub fn classify_opt(text: Option<&str>) -> Condition {
    text.map_or(Condition::General, classify)
}

fn static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("built-in routing pattern must compile")
}
