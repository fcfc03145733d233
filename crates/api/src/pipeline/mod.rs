//! Georectification work functions.
//!
//! These are the bodies submitted to the job queue. Each phase reports
//! progress with a stable step name (the frontend keys its UI off these)
//! and polls cancellation between engine calls; within a call, cancellation
//! drops the in-flight future and the subprocess engine kills its child.
//!
//! Phase layout for processing:
//!
//! ```text
//! initializing 0.0 -> matching 0.1..0.6 -> optimizing 0.6..0.9
//!   -> generating 0.9 -> complete 1.0
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;

use photerra_core::engine::{EstimateSpec, ExportSpec, GeorectifyEngine, MatchSpec, RectifySpec};
use photerra_core::error::CoreError;
use photerra_core::jobs::{Job, JobFuture, JobResult};
use photerra_core::match_cache::{MatchCache, MatchId};
use photerra_core::project::{
    ImageFile, ProcessResult, Project, ProjectStatus, ProjectStore, RasterFile,
};
use photerra_core::recovery::RecoveryStore;
use photerra_core::types::ProjectId;

/// Everything a work function needs, detached from HTTP state so jobs keep
/// running after the submitting request completes.
#[derive(Clone)]
pub struct PipelineContext {
    pub engine: Arc<dyn GeorectifyEngine>,
    pub projects: Arc<ProjectStore>,
    pub recovery: Arc<RecoveryStore>,
    pub match_cache: Arc<MatchCache>,
    pub temp_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub method: String,
    pub optimizer: String,
    pub max_features: Option<u32>,
    pub max_iterations: Option<u32>,
    /// Reuse a cached match outcome instead of re-matching.
    pub match_id: Option<MatchId>,
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_path: String,
    pub crs: Option<String>,
    pub compression: Option<String>,
    pub resolution: Option<f64>,
}

/// Build the work function for a full georectification run.
pub fn georectify_job(
    ctx: PipelineContext,
    project_id: ProjectId,
    options: ProcessOptions,
) -> impl FnOnce(Arc<Job>) -> JobFuture + Send + 'static {
    move |job| Box::pin(run_georectification(ctx, project_id, options, job))
}

/// Build the work function for a GeoTIFF export.
pub fn export_job(
    ctx: PipelineContext,
    project_id: ProjectId,
    options: ExportOptions,
) -> impl FnOnce(Arc<Job>) -> JobFuture + Send + 'static {
    move |job| Box::pin(run_export(ctx, project_id, options, job))
}

async fn run_georectification(
    ctx: PipelineContext,
    project_id: ProjectId,
    options: ProcessOptions,
    job: Arc<Job>,
) -> JobResult {
    job.update_progress(0.0, "initializing", "Preparing inputs");
    let project = ctx.projects.get(project_id).await?;
    let (dsm, ortho, target) = required_inputs(&project)?;

    // Mark the project in flight and checkpoint it: if the process dies
    // mid-run, the checkpoint is what /api/recovery/check offers back.
    let checkpointed = ctx
        .projects
        .update(project_id, |p| p.status = ProjectStatus::Processing)
        .await?;
    ctx.recovery.save_checkpoint(&checkpointed)?;

    let outcome = georectify_phases(&ctx, &project, &options, &dsm, &ortho, &target, &job).await;

    match outcome {
        Ok((camera, result, payload)) => {
            let updated = ctx
                .projects
                .update(project_id, |p| {
                    p.status = ProjectStatus::Completed;
                    p.camera_params = Some(camera.clone());
                    p.process_result = Some(result.clone());
                })
                .await?;
            if let Err(e) = ctx.recovery.clear_checkpoint(project_id) {
                tracing::warn!(project_id = %project_id, error = %e, "Could not clear checkpoint");
            }
            tracing::info!(project_id = %updated.id, "Georectification complete");
            Ok(payload)
        }
        Err(CoreError::Cancelled) => {
            // A cancelled run leaves the project editable again; the
            // checkpoint stays until the user decides what to do with it.
            let _ = ctx
                .projects
                .update(project_id, |p| p.status = ProjectStatus::Draft)
                .await;
            Err(CoreError::Cancelled)
        }
        Err(e) => {
            let _ = ctx
                .projects
                .update(project_id, |p| p.status = ProjectStatus::Error)
                .await;
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn georectify_phases(
    ctx: &PipelineContext,
    project: &Project,
    options: &ProcessOptions,
    dsm: &RasterFile,
    ortho: &RasterFile,
    target: &ImageFile,
    job: &Job,
) -> Result<
    (
        photerra_core::project::CameraParams,
        ProcessResult,
        serde_json::Value,
    ),
    CoreError,
> {
    job.check_cancellation()?;
    job.update_progress(0.1, "matching", "Matching photograph against orthophoto");

    let matches = match options.match_id.and_then(|id| ctx.match_cache.get(id)) {
        Some(cached) => {
            tracing::debug!(project_id = %project.id, "Using cached match outcome");
            cached
        }
        None => {
            let outcome = ctx
                .engine
                .match_images(MatchSpec {
                    dsm_path: dsm.path.clone(),
                    ortho_path: ortho.path.clone(),
                    target_image_path: target.path.clone(),
                    method: options.method.clone(),
                    max_features: options.max_features,
                })
                .await?;
            ctx.match_cache.insert(outcome.clone());
            outcome
        }
    };
    if matches.gcps.is_empty() {
        return Err(CoreError::processing(
            "matching",
            "No correspondences found between the photograph and the orthophoto",
        ));
    }

    job.check_cancellation()?;
    job.update_progress(
        0.6,
        "optimizing",
        &format!("Optimizing camera parameters from {} matches", matches.match_count),
    );
    let estimate = ctx
        .engine
        .estimate(EstimateSpec {
            gcps: matches.gcps.clone(),
            optimizer: options.optimizer.clone(),
            initial: project.camera_params.clone(),
            max_iterations: options.max_iterations,
        })
        .await?;

    job.check_cancellation()?;
    job.update_progress(0.9, "generating", "Projecting photograph onto terrain");
    let rectified = ctx
        .engine
        .rectify(RectifySpec {
            dsm_path: dsm.path.clone(),
            target_image_path: target.path.clone(),
            camera: estimate.camera.clone(),
            resolution: dsm.resolution,
            output_path: Some(scratch_raster_path(&ctx.temp_dir, project.id)),
        })
        .await?;

    job.update_progress(1.0, "complete", "Processing complete");

    let result = ProcessResult {
        geotiff_path: None,
        gcps: matches.gcps.clone(),
        metrics: Some(estimate.metrics.clone()),
        completed_at: Some(chrono::Utc::now()),
    };
    let payload = json!({
        "project_id": project.id,
        "camera": estimate.camera,
        "metrics": estimate.metrics,
        "gcp_count": matches.gcps.len(),
        "raster_path": rectified.raster_path,
        "bounds": rectified.bounds,
    });
    Ok((estimate.camera, result, payload))
}

async fn run_export(
    ctx: PipelineContext,
    project_id: ProjectId,
    options: ExportOptions,
    job: Arc<Job>,
) -> JobResult {
    job.update_progress(0.05, "validating", "Validating project state");
    let project = ctx.projects.get(project_id).await?;
    let (dsm, _ortho, target) = required_inputs(&project)?;
    let camera = project.camera_params.clone().ok_or_else(|| {
        CoreError::Validation(
            "Project has no camera parameters; run georectification first".to_string(),
        )
    })?;

    job.check_cancellation()?;
    job.update_progress(0.2, "loading", "Loading rasters");
    job.update_progress(0.35, "surface", "Sampling terrain surface");
    let rectified = ctx
        .engine
        .rectify(RectifySpec {
            dsm_path: dsm.path.clone(),
            target_image_path: target.path.clone(),
            camera,
            resolution: options.resolution.or(dsm.resolution),
            output_path: Some(scratch_raster_path(&ctx.temp_dir, project_id)),
        })
        .await?;
    job.update_progress(0.6, "projecting", "Projection complete");

    job.check_cancellation()?;
    job.update_progress(0.75, "writing", "Writing GeoTIFF");
    let exported = ctx
        .engine
        .export_geotiff(ExportSpec {
            raster_path: rectified.raster_path,
            output_path: options.output_path.clone(),
            crs: options.crs.clone(),
            compression: options.compression.clone(),
        })
        .await?;

    job.update_progress(0.9, "finalizing", "Finalizing output");
    let _ = ctx
        .projects
        .update(project_id, |p| {
            let result = p.process_result.get_or_insert_with(ProcessResult::default);
            result.geotiff_path = Some(exported.path.clone());
        })
        .await;

    job.update_progress(1.0, "complete", "Processing complete");
    tracing::info!(project_id = %project_id, path = %exported.path, "GeoTIFF exported");

    Ok(json!({
        "path": exported.path,
        "size_bytes": exported.size_bytes,
    }))
}

fn scratch_raster_path(temp_dir: &std::path::Path, project_id: ProjectId) -> String {
    temp_dir
        .join(format!("{project_id}-rectified.tif"))
        .to_string_lossy()
        .into_owned()
}

/// Pull the three required inputs off a project, naming what is missing.
pub fn required_inputs(
    project: &Project,
) -> Result<(RasterFile, RasterFile, ImageFile), CoreError> {
    let inputs = &project.input_data;
    match (&inputs.dsm, &inputs.ortho, &inputs.target_image) {
        (Some(dsm), Some(ortho), Some(target)) => Ok((dsm.clone(), ortho.clone(), target.clone())),
        _ => {
            let mut missing = Vec::new();
            if inputs.dsm.is_none() {
                missing.push("dsm");
            }
            if inputs.ortho.is_none() {
                missing.push("ortho");
            }
            if inputs.target_image.is_none() {
                missing.push("target_image");
            }
            Err(CoreError::Validation(format!(
                "Project is missing required inputs: {}",
                missing.join(", ")
            )))
        }
    }
}
