//! Handlers for the `/recovery` resource.
//!
//! Exposes the checkpoint store to the frontend: list what survived a
//! crash, restore a checkpoint into the project registry, or discard it.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use photerra_core::archive::SUPPORTED_VERSIONS;
use photerra_core::error::CoreError;
use photerra_core::project::Project;
use photerra_core::recovery::{RecoveryInfo, CHECKPOINT_SUFFIX, DEFAULT_MAX_AGE};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RestoreRequest {
    /// Checkpoint filename as returned by `/recovery/check`.
    #[validate(length(min = 1))]
    pub filename: String,
}

#[derive(Debug, Serialize)]
pub struct RecoveryCheckResponse {
    pub checkpoints: Vec<RecoveryInfo>,
    /// Stale checkpoints garbage-collected by this call.
    pub removed: usize,
}

/// Checkpoint filenames are flat `{uuid}.photerra.tmp` names; anything with
/// path separators or the wrong suffix is rejected before touching disk.
fn validate_filename(filename: &str) -> AppResult<()> {
    let well_formed = filename.ends_with(CHECKPOINT_SUFFIX)
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains("..");
    if well_formed {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Invalid recovery filename: {filename}"
        )))
    }
}

/// GET /api/recovery/check
///
/// Garbage-collect checkpoints older than the retention window, then list
/// what remains, newest first.
pub async fn check_recovery(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let removed = state.recovery.cleanup_old(DEFAULT_MAX_AGE);
    let checkpoints = state.recovery.list_checkpoints();

    Ok(Json(DataResponse {
        data: RecoveryCheckResponse {
            checkpoints,
            removed,
        },
    }))
}

/// POST /api/recovery/restore
///
/// Load a checkpoint, validate its version and shape, insert the project
/// into the registry, and clear the checkpoint.
pub async fn restore_checkpoint(
    State(state): State<AppState>,
    Json(input): Json<RestoreRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    validate_filename(&input.filename)?;

    let path = state.recovery.dir().join(&input.filename);
    let payload = state
        .recovery
        .load_checkpoint(&path)
        .ok_or_else(|| CoreError::not_found("Recovery file", &input.filename))?;

    let version = payload
        .get("version")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CoreError::Validation("Checkpoint has no version field".to_string()))?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Unsupported checkpoint version: {version}"
        ))));
    }

    let project = payload
        .get("project")
        .cloned()
        .ok_or_else(|| CoreError::Validation("Checkpoint has no project payload".to_string()))?;
    let project: Project = serde_json::from_value(project)
        .map_err(|e| CoreError::Validation(format!("Invalid checkpoint payload: {e}")))?;

    let project_id = project.id;
    state.projects.insert(project.clone()).await;
    if let Err(e) = state.recovery.clear_checkpoint(project_id) {
        tracing::warn!(project_id = %project_id, error = %e, "Could not clear restored checkpoint");
    }
    tracing::info!(project_id = %project_id, "Project restored from checkpoint");

    Ok(Json(DataResponse { data: project }))
}

/// DELETE /api/recovery/{filename}
///
/// Discard one checkpoint. 404 when it does not exist.
pub async fn delete_checkpoint(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    validate_filename(&filename)?;

    let path = state.recovery.dir().join(&filename);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            tracing::info!(filename = %filename, "Checkpoint discarded");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::Core(
            CoreError::not_found("Recovery file", filename),
        )),
        Err(e) => Err(AppError::Core(e.into())),
    }
}

/// DELETE /api/recovery
///
/// Discard every checkpoint. Returns how many were removed.
pub async fn delete_all_checkpoints(
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let mut removed = 0;
    for info in state.recovery.list_checkpoints() {
        match std::fs::remove_file(&info.path) {
            Ok(()) => removed += 1,
            Err(e) => {
                tracing::warn!(path = %info.path.display(), error = %e, "Could not remove checkpoint");
            }
        }
    }
    tracing::info!(removed, "All checkpoints discarded");

    Ok(Json(DataResponse {
        data: serde_json::json!({ "removed": removed }),
    }))
}
