//! Handlers for the `/georectify` resource.
//!
//! Matching runs inline (it is the one operation the frontend wants a
//! direct answer for, so it can show correspondences before committing to a
//! full run); processing and export are submitted to the job queue and
//! observed over the job WebSocket.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use photerra_core::engine::{EstimateSpec, GeorectifyEngine, MatchOutcome, MatchSpec};
use photerra_core::error::CoreError;
use photerra_core::jobs::JobStatus;
use photerra_core::match_cache::MatchId;
use photerra_core::project::{CameraParams, ProcessMetrics};
use photerra_core::types::{JobId, ProjectId, Timestamp};

use crate::error::{AppError, AppResult};
use crate::pipeline::{self, ExportOptions, PipelineContext, ProcessOptions};
use crate::response::DataResponse;
use crate::state::AppState;

/// Matching methods the engine implements.
const MATCH_METHODS: &[&str] = &["superglue", "loftr", "sift"];

/// Optimizers the engine implements.
const OPTIMIZERS: &[&str] = &["lm", "ransac-lm", "dlt"];

fn validate_method(method: &str) -> Result<(), ValidationError> {
    if MATCH_METHODS.contains(&method) {
        Ok(())
    } else {
        Err(ValidationError::new("unknown_match_method"))
    }
}

fn validate_optimizer(optimizer: &str) -> Result<(), ValidationError> {
    if OPTIMIZERS.contains(&optimizer) {
        Ok(())
    } else {
        Err(ValidationError::new("unknown_optimizer"))
    }
}

fn default_method() -> String {
    "superglue".to_string()
}

fn default_optimizer() -> String {
    "lm".to_string()
}

#[derive(Debug, Deserialize, Validate)]
pub struct MatchRequest {
    pub project_id: ProjectId,
    #[serde(default = "default_method")]
    #[validate(custom(function = validate_method))]
    pub method: String,
    #[validate(range(min = 100, max = 100_000))]
    pub max_features: Option<u32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProcessRequest {
    pub project_id: ProjectId,
    #[serde(default = "default_method")]
    #[validate(custom(function = validate_method))]
    pub method: String,
    #[serde(default = "default_optimizer")]
    #[validate(custom(function = validate_optimizer))]
    pub optimizer: String,
    #[validate(range(min = 100, max = 100_000))]
    pub max_features: Option<u32>,
    #[validate(range(min = 1, max = 1000))]
    pub max_iterations: Option<u32>,
    /// Reuse a previous `/match` outcome.
    pub match_id: Option<MatchId>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EstimateRequest {
    pub project_id: ProjectId,
    #[serde(default = "default_method")]
    #[validate(custom(function = validate_method))]
    pub method: String,
    #[serde(default = "default_optimizer")]
    #[validate(custom(function = validate_optimizer))]
    pub optimizer: String,
    #[validate(range(min = 100, max = 100_000))]
    pub max_features: Option<u32>,
    #[validate(range(min = 1, max = 1000))]
    pub max_iterations: Option<u32>,
    /// Reuse a previous `/match` outcome instead of re-matching.
    pub match_id: Option<MatchId>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExportRequest {
    pub project_id: ProjectId,
    #[validate(length(min = 1))]
    pub output_path: String,
    pub crs: Option<String>,
    pub compression: Option<String>,
    #[validate(range(min = 0.01, max = 1000.0))]
    pub resolution: Option<f64>,
}

/// Accepted-job payload for 202 responses.
#[derive(Debug, Serialize)]
pub struct JobAccepted {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: Timestamp,
}

#[derive(Debug, Serialize)]
pub struct MatchResponse {
    pub match_id: MatchId,
    pub match_count: u32,
    pub gcp_count: usize,
}

#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    pub camera: CameraParams,
    pub metrics: ProcessMetrics,
    pub match_id: MatchId,
    pub gcp_count: usize,
}

/// POST /api/georectify/match
///
/// Run matching inline, cache the outcome, and return its id so a later
/// `/process` call can skip re-matching.
pub async fn run_match(
    State(state): State<AppState>,
    Json(input): Json<MatchRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let engine = require_engine(&state)?;

    let project = state.projects.get(input.project_id).await?;
    let (dsm, ortho, target) = pipeline::required_inputs(&project)?;

    let outcome = engine
        .match_images(MatchSpec {
            dsm_path: dsm.path,
            ortho_path: ortho.path,
            target_image_path: target.path,
            method: input.method,
            max_features: input.max_features,
        })
        .await?;

    let gcp_count = outcome.gcps.len();
    let match_count = outcome.match_count;
    let match_id = state.match_cache.insert(outcome);
    tracing::info!(project_id = %project.id, %match_id, match_count, "Matching complete");

    Ok(Json(DataResponse {
        data: MatchResponse {
            match_id,
            match_count,
            gcp_count,
        },
    }))
}

/// POST /api/georectify/estimate
///
/// Run camera parameter estimation inline, preferably from a cached match
/// outcome, so the frontend can preview a solution without committing to a
/// full georectification job. Leaves the project untouched.
pub async fn run_estimate(
    State(state): State<AppState>,
    Json(input): Json<EstimateRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let engine = require_engine(&state)?;

    let project = state.projects.get(input.project_id).await?;

    let (match_id, matches) = resolve_matches(&state, &*engine, &project, &input).await?;
    if matches.gcps.is_empty() {
        return Err(AppError::Core(CoreError::processing(
            "matching",
            "No correspondences found between the photograph and the orthophoto",
        )));
    }

    let gcp_count = matches.gcps.len();
    let estimate = engine
        .estimate(EstimateSpec {
            gcps: matches.gcps,
            optimizer: input.optimizer,
            initial: project.camera_params.clone(),
            max_iterations: input.max_iterations,
        })
        .await?;
    tracing::info!(project_id = %project.id, %match_id, "Estimation complete");

    Ok(Json(DataResponse {
        data: EstimateResponse {
            camera: estimate.camera,
            metrics: estimate.metrics,
            match_id,
            gcp_count,
        },
    }))
}

/// Cached match outcome when `match_id` resolves, a fresh engine match
/// otherwise.
async fn resolve_matches(
    state: &AppState,
    engine: &dyn GeorectifyEngine,
    project: &photerra_core::project::Project,
    input: &EstimateRequest,
) -> AppResult<(MatchId, MatchOutcome)> {
    if let Some(id) = input.match_id {
        if let Some(cached) = state.match_cache.get(id) {
            return Ok((id, cached));
        }
    }

    let (dsm, ortho, target) = pipeline::required_inputs(project)?;
    let outcome = engine
        .match_images(MatchSpec {
            dsm_path: dsm.path,
            ortho_path: ortho.path,
            target_image_path: target.path,
            method: input.method.clone(),
            max_features: input.max_features,
        })
        .await?;
    let match_id = state.match_cache.insert(outcome.clone());
    Ok((match_id, outcome))
}

/// POST /api/georectify/process
///
/// Submit a full georectification run. Returns 202 immediately; progress is
/// streamed on `/api/jobs/{id}/ws`.
pub async fn start_process(
    State(state): State<AppState>,
    Json(input): Json<ProcessRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let engine = require_engine(&state)?;

    // Fail fast on an unknown project instead of parking the error in a job.
    state.projects.get(input.project_id).await?;

    let ctx = pipeline_context(&state, engine);
    let options = ProcessOptions {
        method: input.method,
        optimizer: input.optimizer,
        max_features: input.max_features,
        max_iterations: input.max_iterations,
        match_id: input.match_id,
    };
    let job = state
        .jobs
        .submit(pipeline::georectify_job(ctx, input.project_id, options))
        .await;

    Ok(accepted(&job))
}

/// POST /api/georectify/export
///
/// Submit a GeoTIFF export. Returns 202 immediately.
pub async fn start_export(
    State(state): State<AppState>,
    Json(input): Json<ExportRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let engine = require_engine(&state)?;

    state.projects.get(input.project_id).await?;

    let ctx = pipeline_context(&state, engine);
    let options = ExportOptions {
        output_path: input.output_path,
        crs: input.crs,
        compression: input.compression,
        resolution: input.resolution,
    };
    let job = state
        .jobs
        .submit(pipeline::export_job(ctx, input.project_id, options))
        .await;

    Ok(accepted(&job))
}

fn require_engine(state: &AppState) -> AppResult<Arc<dyn GeorectifyEngine>> {
    state.engine.clone().ok_or_else(|| {
        AppError::Core(CoreError::Validation(
            "No engine configured; set PHOTERRA_ENGINE_COMMAND".to_string(),
        ))
    })
}

fn pipeline_context(state: &AppState, engine: Arc<dyn GeorectifyEngine>) -> PipelineContext {
    PipelineContext {
        engine,
        projects: Arc::clone(&state.projects),
        recovery: Arc::clone(&state.recovery),
        match_cache: Arc::clone(&state.match_cache),
        temp_dir: state.config.temp_dir.clone(),
    }
}

fn accepted(job: &photerra_core::jobs::Job) -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: JobAccepted {
                id: job.id(),
                status: job.status(),
                created_at: job.created_at(),
            },
        }),
    )
}
