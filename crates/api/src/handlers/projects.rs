//! Handlers for the `/projects` resource.

use std::path::PathBuf;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use validator::Validate;

use photerra_core::archive;
use photerra_core::project::{CameraParams, InputData, Project};
use photerra_core::report::{self, ReportFormat};
use photerra_core::types::ProjectId;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub input_data: Option<InputData>,
    pub camera_params: Option<CameraParams>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ArchivePathRequest {
    #[validate(length(min = 1))]
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct SavedResponse {
    pub path: PathBuf,
}

/// POST /api/projects
///
/// Create a draft project. Returns 201 with the new project.
pub async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<CreateProjectRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let project = Project::new(input.name);
    tracing::info!(project_id = %project.id, name = %project.name, "Project created");
    state.projects.insert(project.clone()).await;

    Ok((StatusCode::CREATED, Json(DataResponse { data: project })))
}

/// GET /api/projects
pub async fn list_projects(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let projects = state.projects.list().await;
    Ok(Json(DataResponse { data: projects }))
}

/// GET /api/projects/{id}
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
) -> AppResult<impl IntoResponse> {
    let project = state.projects.get(id).await?;
    Ok(Json(DataResponse { data: project }))
}

/// PUT /api/projects/{id}
pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
    Json(input): Json<UpdateProjectRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let project = state
        .projects
        .update(id, |project| {
            if let Some(name) = input.name {
                project.name = name;
            }
            if let Some(input_data) = input.input_data {
                project.input_data = input_data;
            }
            if let Some(camera_params) = input.camera_params {
                project.camera_params = Some(camera_params);
            }
        })
        .await?;

    Ok(Json(DataResponse { data: project }))
}

/// DELETE /api/projects/{id}
///
/// Remove the project from the registry and drop any stale checkpoint for
/// it. Returns 204.
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
) -> AppResult<impl IntoResponse> {
    state.projects.remove(id).await?;
    if let Err(e) = state.recovery.clear_checkpoint(id) {
        tracing::warn!(project_id = %id, error = %e, "Could not clear checkpoint for deleted project");
    }
    tracing::info!(project_id = %id, "Project deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub format: Option<String>,
}

/// GET /api/projects/{id}/report?format=json|text
///
/// Generate a processing report from the project's current state. JSON by
/// default; `format=text` returns a plain-text rendition.
pub async fn get_project_report(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
    Query(query): Query<ReportQuery>,
) -> AppResult<impl IntoResponse> {
    let format = ReportFormat::parse(query.format.as_deref().unwrap_or("json"))?;
    let project = state.projects.get(id).await?;
    let content = report::generate_report(&project, format)?;

    let content_type = match format {
        ReportFormat::Json => "application/json",
        ReportFormat::Text => "text/plain; charset=utf-8",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], content))
}

/// POST /api/projects/{id}/save
///
/// Write the project to a `.photerra` archive at the requested path.
pub async fn save_project(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
    Json(input): Json<ArchivePathRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let project = state.projects.get(id).await?;
    let path = archive::save_project(&project, std::path::Path::new(&input.path))?;

    Ok(Json(DataResponse {
        data: SavedResponse { path },
    }))
}

/// POST /api/projects/load
///
/// Load a `.photerra` archive and register it, replacing any in-memory
/// project with the same id.
pub async fn load_project(
    State(state): State<AppState>,
    Json(input): Json<ArchivePathRequest>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let project = archive::load_project(std::path::Path::new(&input.path))?;
    state.projects.insert(project.clone()).await;

    Ok(Json(DataResponse { data: project }))
}
