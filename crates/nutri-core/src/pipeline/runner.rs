//! The plan-assembly pipeline.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{ConfigError, NutriSettings, PipelineMode};

use super::artifacts::{PatientRef, PlanRequest, decode_artifact};
use super::{
    CaseState, Conflicts, DietRules, Gaps, HttpStageClient, PipelineFailure, Plan, Profile, Stage,
    StageClient, StageError, Targets,
};

/// Timing for one stage call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub started_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub ok: bool,
}

/// Everything known about one case run.
#[derive(Debug)]
pub struct CaseReport {
    pub run_id: Uuid,
    pub patient_id: String,
    pub submitted_at: DateTime<Utc>,
    /// Final state: `PlanReady` or `Failed`.
    pub state: CaseState,
    /// Stage calls that finished, in the order their outcome was recorded.
    pub stages: Vec<StageRecord>,
    pub outcome: Result<Plan, PipelineFailure>,
}

impl CaseReport {
    pub fn plan(&self) -> Option<&Plan> {
        self.outcome.as_ref().ok()
    }

    pub fn failure(&self) -> Option<&PipelineFailure> {
        self.outcome.as_ref().err()
    }

    pub fn into_result(self) -> Result<Plan, PipelineFailure> {
        self.outcome
    }
}

/// A failed stage together with its timing.
struct StageFault {
    failure: PipelineFailure,
    record: StageRecord,
}

impl StageFault {
    fn unmeasured(stage: Stage, cause: StageError) -> Self {
        Self {
            failure: PipelineFailure::new(stage, cause),
            record: StageRecord {
                stage,
                started_at: Utc::now(),
                latency_ms: 0,
                ok: false,
            },
        }
    }
}

/// State and timings accumulated while a case runs.
struct Progress {
    state: CaseState,
    records: Vec<StageRecord>,
}

impl Progress {
    fn new() -> Self {
        Self {
            state: CaseState::Submitted,
            records: Vec::new(),
        }
    }

    fn complete(&mut self, record: StageRecord) {
        let next = CaseState::after(record.stage);
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid case transition {} -> {next}",
            self.state
        );
        tracing::debug!(from = %self.state, to = %next, "case transition");
        self.state = next;
        self.records.push(record);
    }

    fn fail(&mut self, fault: StageFault) -> PipelineFailure {
        self.state = CaseState::Failed {
            stage: fault.failure.stage,
        };
        self.records.push(fault.record);
        fault.failure
    }
}

/// Drives a [`Profile`] through the five stages.
///
/// Stage 5 runs only after stages 1-4 have all produced artifacts. The
/// first error aborts the case; nothing is retried and artifacts already
/// produced are dropped.
#[derive(Clone)]
pub struct PlanPipeline {
    client: Arc<dyn StageClient>,
    mode: PipelineMode,
}

impl PlanPipeline {
    /// Sequential pipeline over `client`.
    pub fn new(client: Arc<dyn StageClient>) -> Self {
        Self {
            client,
            mode: PipelineMode::Sequential,
        }
    }

    pub fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = mode;
        self
    }

    /// HTTP pipeline configured from `settings`.
    pub fn from_settings(settings: &NutriSettings) -> Result<Self, ConfigError> {
        let client = HttpStageClient::new(settings.stages.clone(), settings.stage_timeouts)?;
        Ok(Self::new(Arc::new(client)).with_mode(settings.pipeline_mode))
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    /// Assemble a plan for `profile`.
    pub async fn assemble(&self, profile: &Profile) -> Result<Plan, PipelineFailure> {
        self.assemble_cancellable(profile, &CancellationToken::new())
            .await
    }

    /// Like [`Self::assemble`], aborting the in-flight stage when `cancel`
    /// fires.
    pub async fn assemble_cancellable(
        &self,
        profile: &Profile,
        cancel: &CancellationToken,
    ) -> Result<Plan, PipelineFailure> {
        self.run(profile, cancel).await.into_result()
    }

    /// Run a case and report its final state and per-stage timings.
    pub async fn run(&self, profile: &Profile, cancel: &CancellationToken) -> CaseReport {
        let run_id = Uuid::new_v4();
        let submitted_at = Utc::now();
        let span = tracing::info_span!("case", %run_id, patient_id = %profile.patient_id);

        async move {
            tracing::info!(mode = ?self.mode, "case submitted");
            let mut progress = Progress::new();

            let outcome = match self.drive(profile, cancel, &mut progress).await {
                Ok(plan) => {
                    tracing::info!("plan assembled");
                    Ok(plan)
                }
                Err(fault) => {
                    let failure = progress.fail(fault);
                    tracing::error!(
                        stage = %failure.stage,
                        error = %failure.cause,
                        "case failed"
                    );
                    Err(failure)
                }
            };

            CaseReport {
                run_id,
                patient_id: profile.patient_id.clone(),
                submitted_at,
                state: progress.state,
                stages: progress.records,
                outcome,
            }
        }
        .instrument(span)
        .await
    }

    async fn drive(
        &self,
        profile: &Profile,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<Plan, StageFault> {
        let patient_id = profile.patient_id.as_str();
        let profile_body = encode(Stage::DietRules, profile)?;
        let patient_body = encode(Stage::Gaps, &PatientRef { patient_id })?;

        let (diet_rules, gaps, targets, conflicts) = match self.mode {
            PipelineMode::Sequential => {
                let (diet_rules, r) = self
                    .fetch::<DietRules>(Stage::DietRules, &profile_body, patient_id, cancel)
                    .await?;
                progress.complete(r);
                let (gaps, r) = self
                    .fetch::<Gaps>(Stage::Gaps, &patient_body, patient_id, cancel)
                    .await?;
                progress.complete(r);
                let (targets, r) = self
                    .fetch::<Targets>(Stage::Targets, &patient_body, patient_id, cancel)
                    .await?;
                progress.complete(r);
                let (conflicts, r) = self
                    .fetch::<Conflicts>(Stage::Conflicts, &patient_body, patient_id, cancel)
                    .await?;
                progress.complete(r);
                (diet_rules, gaps, targets, conflicts)
            }
            PipelineMode::Concurrent => {
                let ((diet_rules, r1), (gaps, r2), (targets, r3), (conflicts, r4)) = tokio::try_join!(
                    self.fetch::<DietRules>(Stage::DietRules, &profile_body, patient_id, cancel),
                    self.fetch::<Gaps>(Stage::Gaps, &patient_body, patient_id, cancel),
                    self.fetch::<Targets>(Stage::Targets, &patient_body, patient_id, cancel),
                    self.fetch::<Conflicts>(Stage::Conflicts, &patient_body, patient_id, cancel),
                )?;
                for record in [r1, r2, r3, r4] {
                    progress.complete(record);
                }
                (diet_rules, gaps, targets, conflicts)
            }
        };

        let plan_body = encode(
            Stage::Plan,
            &PlanRequest {
                patient_id,
                diet_rules: &diet_rules,
                gaps: &gaps,
                targets: &targets,
                conflicts: &conflicts,
            },
        )?;
        let (plan, r) = self
            .fetch::<Plan>(Stage::Plan, &plan_body, patient_id, cancel)
            .await?;
        progress.complete(r);
        Ok(plan)
    }

    /// Call one stage and decode its artifact.
    async fn fetch<T: DeserializeOwned>(
        &self,
        stage: Stage,
        payload: &Value,
        patient_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(T, StageRecord), StageFault> {
        let started_at = Utc::now();
        let started = Instant::now();
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StageError::Cancelled),
            reply = self.client.call(stage, payload) => reply,
        };
        let result = reply.and_then(|value| decode_artifact::<T>(stage, patient_id, value));
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(artifact) => {
                tracing::info!(%stage, latency_ms, "stage complete");
                Ok((
                    artifact,
                    StageRecord {
                        stage,
                        started_at,
                        latency_ms,
                        ok: true,
                    },
                ))
            }
            Err(cause) => {
                tracing::warn!(%stage, latency_ms, error = %cause, "stage failed");
                Err(StageFault {
                    failure: PipelineFailure::new(stage, cause),
                    record: StageRecord {
                        stage,
                        started_at,
                        latency_ms,
                        ok: false,
                    },
                })
            }
        }
    }
}

impl std::fmt::Debug for PlanPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanPipeline")
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

fn encode<T: Serialize + ?Sized>(stage: Stage, body: &T) -> Result<Value, StageFault> {
    serde_json::to_value(body).map_err(|e| {
        StageFault::unmeasured(stage, StageError::Malformed(format!("request body: {e}")))
    })
}
