//! Versioned request and stage artifacts.
//!
//! Every artifact carries `version` and `patient_id`. Before a stage
//! response is deserialized, [`check_envelope`] verifies that it belongs to
//! the case's patient and speaks the supported version.

use std::collections::BTreeMap;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::{Stage, StageError};

/// The only artifact version this crate reads or writes.
pub const SCHEMA_VERSION: &str = "v1";

const SCHEMA_NAMES: [&str; 6] = [
    "Profile.v1",
    "DietRules.v1",
    "Gaps.v1",
    "Targets.v1",
    "Conflicts.v1",
    "Plan.v1",
];

/// Names of every versioned schema, profile first.
pub fn schema_names() -> &'static [&'static str] {
    &SCHEMA_NAMES
}

fn default_version() -> String {
    SCHEMA_VERSION.to_owned()
}

/// A patient's structured submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default = "default_version")]
    pub version: String,
    pub patient_id: String,
    pub age: u32,
    pub sex: String,
    pub bmi: f64,
    #[serde(default)]
    pub diagnoses_icd: Vec<String>,
    pub activity: String,
    pub culture: String,
    pub locale: String,
    pub budget: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub medications: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allergies: Vec<String>,
    /// Lab values keyed by name, e.g. `{"hba1c": 7.1}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labs: Option<BTreeMap<String, f64>>,
}

/// Body of `/diet-rules`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DietRuleSet {
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub limit: Vec<String>,
    #[serde(default)]
    pub avoid: Vec<String>,
    #[serde(default)]
    pub portions: Map<String, Value>,
    #[serde(default)]
    pub notes: Vec<String>,
    /// Rule keys beyond the common five, forwarded to the plan stage as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DietRules {
    #[serde(default = "default_version")]
    pub version: String,
    pub patient_id: String,
    pub rules: DietRuleSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gaps {
    #[serde(default = "default_version")]
    pub version: String,
    pub patient_id: String,
    pub gaps: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Targets {
    #[serde(default = "default_version")]
    pub version: String,
    pub patient_id: String,
    #[serde(deserialize_with = "whole_kcal")]
    pub kcal: u32,
    pub macros: BTreeMap<String, f64>,
    #[serde(default)]
    pub micros: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflicts {
    #[serde(default = "default_version")]
    pub version: String,
    pub patient_id: String,
    #[serde(default)]
    pub items: Vec<Map<String, Value>>,
}

/// The assembled nutrition plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default = "default_version")]
    pub version: String,
    pub patient_id: String,
    pub plan: Map<String, Value>,
    #[serde(default)]
    pub shopping_list: Vec<String>,
    #[serde(default)]
    pub trace: Map<String, Value>,
}

/// Accept `1800` and `1800.0`; reject fractions, negatives and overflow.
fn whole_kcal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let kcal = f64::deserialize(deserializer)?;
    if kcal.fract() != 0.0 || !(0.0..=f64::from(u32::MAX)).contains(&kcal) {
        return Err(D::Error::custom(format!(
            "kcal must be a whole non-negative number, got {kcal}"
        )));
    }
    Ok(kcal as u32)
}

// ---------------------------------------------------------------------------
// Stage request bodies
// ---------------------------------------------------------------------------

/// Body sent to stages 2-4.
#[derive(Debug, Serialize)]
pub(crate) struct PatientRef<'a> {
    pub patient_id: &'a str,
}

/// Body sent to the plan stage.
#[derive(Debug, Serialize)]
pub(crate) struct PlanRequest<'a> {
    pub patient_id: &'a str,
    pub diet_rules: &'a DietRules,
    pub gaps: &'a Gaps,
    pub targets: &'a Targets,
    pub conflicts: &'a Conflicts,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Verify that `value` is an object for `patient_id` at [`SCHEMA_VERSION`].
///
/// A missing or different `patient_id` is a [`StageError::Mismatch`]; a
/// `version` other than `v1` is [`StageError::Malformed`]. An absent
/// `version` is accepted.
pub fn check_envelope(stage: Stage, patient_id: &str, value: &Value) -> Result<(), StageError> {
    let object = value.as_object().ok_or_else(|| {
        StageError::Malformed(format!("{} response is not a JSON object", stage.schema()))
    })?;

    let got = object.get("patient_id").and_then(Value::as_str);
    if got != Some(patient_id) {
        return Err(StageError::Mismatch {
            expected: patient_id.to_owned(),
            got: got.map(str::to_owned),
        });
    }

    match object.get("version") {
        None => Ok(()),
        Some(Value::String(v)) if v == SCHEMA_VERSION => Ok(()),
        Some(other) => Err(StageError::Malformed(format!(
            "unsupported {} version {other}",
            stage.schema()
        ))),
    }
}

/// Check the envelope, then deserialize the typed artifact.
pub fn decode_artifact<T: DeserializeOwned>(
    stage: Stage,
    patient_id: &str,
    value: Value,
) -> Result<T, StageError> {
    check_envelope(stage, patient_id, &value)?;
    serde_json::from_value(value)
        .map_err(|e| StageError::Malformed(format!("{}: {e}", stage.schema())))
}
