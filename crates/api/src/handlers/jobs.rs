//! Handlers for the `/jobs` resource.
//!
//! Jobs are created by the georectify endpoints; this module only exposes
//! inspection and cancellation. Progress streaming lives in [`crate::ws`].

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use photerra_core::error::CoreError;
use photerra_core::types::JobId;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/jobs/{id}
///
/// Return the job's current snapshot. Never blocks on job completion.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state
        .jobs
        .get(job_id)
        .await
        .ok_or_else(|| CoreError::not_found("Job", job_id))?;

    Ok(Json(DataResponse {
        data: job.snapshot(),
    }))
}

/// DELETE /api/jobs/{id}
///
/// Cancel a pending or running job. Returns the cancelled snapshot once the
/// job has actually reached its terminal state; 404 for an unknown id, 409
/// if the job already finished.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state
        .jobs
        .get(job_id)
        .await
        .ok_or_else(|| CoreError::not_found("Job", job_id))?;

    if job.status().is_terminal() {
        return Err(AppError::Core(CoreError::Conflict(
            "Job is already in a terminal state and cannot be cancelled".into(),
        )));
    }

    let job = state.jobs.cancel(job_id).await?;
    tracing::info!(job_id = %job_id, "Job cancelled via API");

    Ok(Json(DataResponse {
        data: job.snapshot(),
    }))
}
