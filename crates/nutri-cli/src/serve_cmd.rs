use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use nutri_core::pipeline::{Plan, PlanPipeline, Profile, Stage, schema_names};
use nutri_core::{ChatReply, Condition, NutriSettings, PipelineFailure, SpecialistRegistry};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    message: String,
    stage: Option<Stage>,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
            stage: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
            stage: None,
        }
    }

    /// A stage service failed; the case could not be assembled.
    pub fn bad_gateway(failure: &PipelineFailure) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: failure.cause.to_string(),
            stage: Some(failure.stage),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = match self.stage {
            Some(stage) => serde_json::json!({ "error": self.message, "stage": stage }),
            None => serde_json::json!({ "error": self.message }),
        };
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub condition: Condition,
    /// Every matching condition in precedence order.
    pub matches: Vec<Condition>,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Latest assembled plan per patient, holding at most `capacity` patients.
/// Past that, the patient stored longest ago is evicted. Lost on restart.
#[derive(Debug)]
pub struct CaseStore {
    plans: HashMap<String, Plan>,
    order: VecDeque<String>,
    capacity: usize,
}

impl CaseStore {
    pub const DEFAULT_CAPACITY: usize = 10_000;

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            plans: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Store `plan`, replacing any earlier plan for the same patient.
    pub fn insert(&mut self, plan: Plan) {
        let patient_id = plan.patient_id.clone();
        if self.plans.insert(patient_id.clone(), plan).is_some() {
            return;
        }
        self.order.push_back(patient_id);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.plans.remove(&oldest);
            }
        }
    }

    pub fn get(&self, patient_id: &str) -> Option<&Plan> {
        self.plans.get(patient_id)
    }
}

impl Default for CaseStore {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SpecialistRegistry>,
    pub pipeline: PlanPipeline,
    pub cases: Arc<RwLock<CaseStore>>,
    /// Cancelled on shutdown to abort in-flight cases.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(registry: SpecialistRegistry, pipeline: PlanPipeline) -> Self {
        Self {
            registry: Arc::new(registry),
            pipeline,
            cases: Arc::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn from_settings(settings: &NutriSettings) -> Result<Self> {
        let registry = SpecialistRegistry::from_settings(settings);
        let pipeline = PlanPipeline::from_settings(settings)?;
        Ok(Self::new(registry, pipeline))
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/v1/classify", post(classify))
        .route("/v1/cases", post(create_case))
        .route("/v1/cases/{patient_id}/plan", get(get_case_plan))
        .route("/v1/schemas", get(list_schemas))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(settings: &NutriSettings, bind: &str, port: u16) -> Result<()> {
    let state = AppState::from_settings(settings)?;
    let shutdown = state.shutdown.clone();
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("nutri serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    tracing::info!("nutri serve shut down");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        return;
    }
    shutdown.cancel();
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok", "service": "nutri" }))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<ChatReply>, AppError> {
    if request.message.trim().is_empty() {
        return Err(AppError::bad_request("message must not be empty"));
    }
    Ok(Json(state.registry.chat(&request.message).await))
}

async fn classify(
    State(state): State<AppState>,
    Json(request): Json<MessageRequest>,
) -> Json<ClassifyResponse> {
    let router = state.registry.router();
    Json(ClassifyResponse {
        condition: router.classify(&request.message),
        matches: router.matches(&request.message),
    })
}

async fn create_case(
    State(state): State<AppState>,
    Json(profile): Json<Profile>,
) -> Result<Json<Plan>, AppError> {
    let report = state.pipeline.run(&profile, &state.shutdown).await;
    match report.into_result() {
        Ok(plan) => {
            state.cases.write().await.insert(plan.clone());
            Ok(Json(plan))
        }
        Err(failure) => Err(AppError::bad_gateway(&failure)),
    }
}

async fn get_case_plan(
    State(state): State<AppState>,
    Path(patient_id): Path<String>,
) -> Result<Json<Plan>, AppError> {
    state
        .cases
        .read()
        .await
        .get(&patient_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no plan for patient {patient_id}")))
}

async fn list_schemas() -> Json<Vec<&'static str>> {
    Json(schema_names().to_vec())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
