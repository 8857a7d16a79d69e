//! `nutri plan`: assemble a plan for a profile file.

use std::path::Path;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use nutri_core::pipeline::{CaseReport, PlanPipeline, Profile};
use nutri_core::{NutriSettings, PipelineMode};

/// Read a JSON profile from `path`.
pub fn read_profile(path: &Path) -> Result<Profile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile at {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse profile at {}", path.display()))
}

/// One line per stage: name, latency, outcome.
pub fn format_stages(report: &CaseReport) -> String {
    report
        .stages
        .iter()
        .map(|r| {
            format!(
                "  {:<11} {:>6} ms  {}",
                r.stage.to_string(),
                r.latency_ms,
                if r.ok { "ok" } else { "FAILED" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub async fn run_plan(settings: &NutriSettings, path: &Path, concurrent: bool) -> Result<()> {
    let profile = read_profile(path)?;

    let mut pipeline = PlanPipeline::from_settings(settings)?;
    if concurrent {
        pipeline = pipeline.with_mode(PipelineMode::Concurrent);
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let report = pipeline.run(&profile, &cancel).await;
    eprintln!(
        "case {} for {} ({}): {}",
        report.run_id,
        report.patient_id,
        report.submitted_at.to_rfc3339(),
        report.state
    );
    eprintln!("{}", format_stages(&report));

    let plan = report.into_result()?;
    let out = serde_json::to_string_pretty(&plan).context("failed to serialize plan")?;
    println!("{out}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn read_profile_parses_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"patient_id": "P3", "age": 70, "sex": "male", "bmi": 24.0,
                "diagnoses_icd": ["N18.3"], "activity": "sedentary",
                "culture": "bengali", "locale": "IN-WB", "budget": 90.0}}"#
        )
        .unwrap();

        let profile = read_profile(file.path()).unwrap();
        assert_eq!(profile.patient_id, "P3");
        assert_eq!(profile.version, "v1");
    }

    #[test]
    fn read_profile_reports_path_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = read_profile(file.path()).unwrap_err();
        assert!(format!("{err}").contains("failed to parse profile"));
    }

    #[tokio::test]
    async fn run_plan_fails_with_stage_name() {
        let server = nutri_test_utils::spawn(nutri_test_utils::stage_router(vec![(
            "/targets",
            nutri_test_utils::failing(axum::http::StatusCode::INTERNAL_SERVER_ERROR),
        )]))
        .await;
        let settings = NutriSettings {
            stages: nutri_core::StageEndpoints::uniform(server.base_url()),
            ..NutriSettings::default()
        };

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"patient_id": "P4", "age": 38, "sex": "female", "bmi": 22.0,
                "activity": "active", "culture": "tamil", "locale": "IN-TN", "budget": 100.0}}"#
        )
        .unwrap();

        let err = run_plan(&settings, file.path(), false).await.unwrap_err();
        assert!(format!("{err}").contains("stage targets"), "{err}");
    }
}
