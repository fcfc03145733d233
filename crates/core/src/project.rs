//! Project model and in-memory registry.
//!
//! A `Project` bundles the three inputs of a georectification run (DSM,
//! orthophoto, oblique target photograph) with the estimated camera
//! parameters and the latest processing result. Projects live in memory for
//! the lifetime of the server; durability comes from the `.photerra` archive
//! ([`crate::archive`]) and the crash-recovery checkpoints
//! ([`crate::recovery`]).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::CoreError;
use crate::types::{ProjectId, Timestamp};

/// Project file format version written into archives and checkpoints.
pub const PROJECT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Draft,
    Processing,
    Completed,
    Error,
}

/// Geographic extent in the raster's CRS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// A georeferenced raster input (DSM or orthophoto).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterFile {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
    /// Ground sample distance in CRS units per pixel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<f64>,
}

/// EXIF fields the pipeline consumes as estimation hints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExifData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focal_length_mm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gps_altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<String>,
}

/// The oblique ground photograph to be georectified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageFile {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exif: Option<ExifData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsm: Option<RasterFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ortho: Option<RasterFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_image: Option<ImageFile>,
}

/// Exterior + interior orientation of the camera that took the target
/// photograph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraParams {
    /// Camera position `[x, y, z]` in the DSM's CRS.
    pub position: [f64; 3],
    /// Rotation `[omega, phi, kappa]` in degrees.
    pub rotation: [f64; 3],
    /// Vertical field of view in degrees.
    pub fov_deg: f64,
}

/// One image-to-world correspondence produced by matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gcp {
    pub image_x: f64,
    pub image_y: f64,
    pub world_x: f64,
    pub world_y: f64,
    pub world_z: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rmse: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inlier_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_secs: Option<f64>,
}

/// Outcome of the most recent georectification run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geotiff_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gcps: Vec<Gcp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ProcessMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub version: String,
    pub name: String,
    pub status: ProjectStatus,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub input_data: InputData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_params: Option<CameraParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_result: Option<ProcessResult>,
}

impl Project {
    pub fn new(name: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id: ProjectId::new_v4(),
            version: PROJECT_VERSION.to_string(),
            name: name.into(),
            status: ProjectStatus::Draft,
            created_at: now,
            updated_at: now,
            input_data: InputData::default(),
            camera_params: None,
            process_result: None,
        }
    }

    /// Stamp `updated_at`. Call after any mutation.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now();
    }
}

/// In-memory project registry, shared via `Arc` through the server state.
#[derive(Default)]
pub struct ProjectStore {
    projects: RwLock<HashMap<ProjectId, Project>>,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a project (used by create and by recovery restore).
    pub async fn insert(&self, project: Project) {
        self.projects.write().await.insert(project.id, project);
    }

    pub async fn get(&self, id: ProjectId) -> Result<Project, CoreError> {
        self.projects
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Project", id))
    }

    /// All projects, most recently updated first.
    pub async fn list(&self) -> Vec<Project> {
        let mut projects: Vec<Project> = self.projects.read().await.values().cloned().collect();
        projects.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        projects
    }

    /// Apply a mutation under the write lock and return the updated copy.
    /// `updated_at` is stamped after the mutation runs.
    pub async fn update<F>(&self, id: ProjectId, mutate: F) -> Result<Project, CoreError>
    where
        F: FnOnce(&mut Project),
    {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("Project", id))?;
        mutate(project);
        project.touch();
        Ok(project.clone())
    }

    pub async fn remove(&self, id: ProjectId) -> Result<Project, CoreError> {
        self.projects
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| CoreError::not_found("Project", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = ProjectStore::new();
        let project = Project::new("valley");
        let id = project.id;
        store.insert(project).await;

        let loaded = store.get(id).await.unwrap();
        assert_eq!(loaded.name, "valley");
        assert_eq!(loaded.status, ProjectStatus::Draft);
        assert_eq!(loaded.version, PROJECT_VERSION);
    }

    #[tokio::test]
    async fn get_unknown_is_not_found() {
        let store = ProjectStore::new();
        let err = store.get(ProjectId::new_v4()).await.unwrap_err();
        assert_matches!(err, CoreError::NotFound { entity: "Project", .. });
    }

    #[tokio::test]
    async fn update_stamps_updated_at() {
        let store = ProjectStore::new();
        let project = Project::new("before");
        let id = project.id;
        let created = project.updated_at;
        store.insert(project).await;

        let updated = store
            .update(id, |p| {
                p.name = "after".to_string();
                p.status = ProjectStatus::Processing;
            })
            .await
            .unwrap();

        assert_eq!(updated.name, "after");
        assert_eq!(updated.status, ProjectStatus::Processing);
        assert!(updated.updated_at >= created);
    }

    #[tokio::test]
    async fn list_orders_by_most_recent_update() {
        let store = ProjectStore::new();
        let first = Project::new("first");
        let second = Project::new("second");
        let first_id = first.id;
        store.insert(first).await;
        store.insert(second).await;

        store.update(first_id, |_| {}).await.unwrap();

        let listed = store.list().await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first_id);
    }

    #[tokio::test]
    async fn remove_is_terminal() {
        let store = ProjectStore::new();
        let project = Project::new("gone");
        let id = project.id;
        store.insert(project).await;

        store.remove(id).await.unwrap();
        assert_matches!(store.remove(id).await, Err(CoreError::NotFound { .. }));
    }

    #[test]
    fn optional_fields_are_omitted_from_json() {
        let project = Project::new("minimal");
        let value = serde_json::to_value(&project).unwrap();
        assert!(value.get("camera_params").is_none());
        assert!(value.get("process_result").is_none());
        assert_eq!(value["status"], "draft");
    }
}
