//! Seam to the external computer-vision engine.
//!
//! All numerically heavy work (feature matching, camera-parameter
//! optimization, terrain projection, GeoTIFF writing) lives behind
//! [`GeorectifyEngine`]. The server only orchestrates: it builds typed
//! specs from project state, awaits typed outcomes, and reports progress.
//! Production uses the subprocess-backed [`ToolEngine`]; tests substitute
//! in-process fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::project::{BoundingBox, CameraParams, Gcp, ProcessMetrics};

mod subprocess;

pub use subprocess::ToolEngine;

/// Inputs for cross-view feature matching between the orthophoto and the
/// oblique target photograph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSpec {
    pub dsm_path: String,
    pub ortho_path: String,
    pub target_image_path: String,
    /// Matching method identifier, validated upstream.
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_features: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub gcps: Vec<Gcp>,
    pub match_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ProcessMetrics>,
}

/// Inputs for camera-parameter estimation from ground control points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateSpec {
    pub gcps: Vec<Gcp>,
    pub optimizer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<CameraParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateOutcome {
    pub camera: CameraParams,
    pub metrics: ProcessMetrics,
}

/// Inputs for projecting the photograph onto the terrain surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RectifySpec {
    pub dsm_path: String,
    pub target_image_path: String,
    pub camera: CameraParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<f64>,
    /// Where to place the intermediate raster; the engine picks a location
    /// when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RectifyOutcome {
    /// Intermediate rectified raster on disk.
    pub raster_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<BoundingBox>,
}

/// Inputs for the final GeoTIFF export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSpec {
    pub raster_path: String,
    pub output_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOutcome {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// The long-running operations the pipeline drives.
///
/// Implementations must tolerate being dropped mid-call: a cancelled job
/// drops the in-flight future, and whatever external work it started has to
/// stop without corrupting output files.
#[async_trait]
pub trait GeorectifyEngine: Send + Sync {
    async fn match_images(&self, spec: MatchSpec) -> Result<MatchOutcome, CoreError>;

    async fn estimate(&self, spec: EstimateSpec) -> Result<EstimateOutcome, CoreError>;

    async fn rectify(&self, spec: RectifySpec) -> Result<RectifyOutcome, CoreError>;

    async fn export_geotiff(&self, spec: ExportSpec) -> Result<ExportOutcome, CoreError>;
}
