//! Processing report generation.
//!
//! Renders a project's inputs, camera solution, and quality metrics either
//! as structured JSON for the frontend or as plain text suitable for saving
//! alongside a delivered GeoTIFF. The report is a pure function of project
//! state; it never touches the filesystem.

use serde_json::{json, Value};

use crate::error::CoreError;
use crate::project::{CameraParams, Project};

/// Version stamped into every generated report.
pub const REPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Json,
    Text,
}

impl ReportFormat {
    /// Parse a user-supplied format name.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            other => Err(CoreError::Validation(format!(
                "Unsupported report format: {other}. Use 'json' or 'text'."
            ))),
        }
    }
}

/// Generate a processing report for `project` in the requested format.
pub fn generate_report(project: &Project, format: ReportFormat) -> Result<String, CoreError> {
    let data = build_report_data(project);
    match format {
        ReportFormat::Json => serde_json::to_string_pretty(&data)
            .map_err(|e| CoreError::Io(std::io::Error::other(e))),
        ReportFormat::Text => Ok(format_text(&data)),
    }
}

fn build_report_data(project: &Project) -> Value {
    let mut report = json!({
        "report_generated_at": chrono::Utc::now(),
        "report_version": REPORT_VERSION,
        "project": {
            "id": project.id,
            "name": project.name,
            "status": project.status,
            "version": project.version,
            "created_at": project.created_at,
            "updated_at": project.updated_at,
        },
        "input_data": {},
        "camera_params": Value::Null,
        "processing_result": {},
    });

    let inputs = &project.input_data;
    if let Some(dsm) = &inputs.dsm {
        report["input_data"]["dsm"] = json!(dsm);
    }
    if let Some(ortho) = &inputs.ortho {
        report["input_data"]["ortho"] = json!(ortho);
    }
    if let Some(target) = &inputs.target_image {
        report["input_data"]["target_image"] = json!(target);
    }

    if let Some(camera) = &project.camera_params {
        report["camera_params"] = camera_section(camera);
    }

    if let Some(result) = &project.process_result {
        if let Some(metrics) = &result.metrics {
            report["processing_result"]["metrics"] = json!(metrics);
        }
        if !result.gcps.is_empty() {
            report["processing_result"]["gcps"] = json!(result.gcps);
        }
        if let Some(path) = &result.geotiff_path {
            report["processing_result"]["geotiff_path"] = json!(path);
        }
        if let Some(completed_at) = &result.completed_at {
            report["processing_result"]["completed_at"] = json!(completed_at);
        }
    }

    report
}

fn camera_section(camera: &CameraParams) -> Value {
    json!({
        "position": {
            "x": camera.position[0],
            "y": camera.position[1],
            "z": camera.position[2],
        },
        "rotation": {
            "omega": camera.rotation[0],
            "phi": camera.rotation[1],
            "kappa": camera.rotation[2],
        },
        "fov_deg": camera.fov_deg,
    })
}

fn format_text(data: &Value) -> String {
    let mut lines: Vec<String> = Vec::new();
    let rule = "=".repeat(60);
    let sub = "-".repeat(40);

    lines.push(rule.clone());
    lines.push("GEORECTIFICATION PROCESSING REPORT".to_string());
    lines.push(rule.clone());
    lines.push(String::new());
    lines.push(format!(
        "Generated at: {}",
        field(&data["report_generated_at"])
    ));
    lines.push(format!("Report version: {}", field(&data["report_version"])));
    lines.push(String::new());

    lines.push(sub.clone());
    lines.push("PROJECT INFORMATION".to_string());
    lines.push(sub.clone());
    let project = &data["project"];
    lines.push(format!("Name: {}", field(&project["name"])));
    lines.push(format!("ID: {}", field(&project["id"])));
    lines.push(format!("Status: {}", field(&project["status"])));
    lines.push(format!("Created: {}", field(&project["created_at"])));
    lines.push(format!("Updated: {}", field(&project["updated_at"])));
    lines.push(String::new());

    lines.push(sub.clone());
    lines.push("INPUT DATA".to_string());
    lines.push(sub.clone());
    let inputs = &data["input_data"];
    if let Some(dsm) = inputs.get("dsm").filter(|v| !v.is_null()) {
        lines.push("DSM (Digital Surface Model):".to_string());
        lines.push(format!("  Path: {}", field(&dsm["path"])));
        lines.push(format!("  CRS: {}", field(&dsm["crs"])));
        lines.push(format!("  Resolution: {}", field(&dsm["resolution"])));
        lines.push(String::new());
    }
    if let Some(ortho) = inputs.get("ortho").filter(|v| !v.is_null()) {
        lines.push("Orthophoto:".to_string());
        lines.push(format!("  Path: {}", field(&ortho["path"])));
        lines.push(format!("  CRS: {}", field(&ortho["crs"])));
        lines.push(String::new());
    }
    if let Some(target) = inputs.get("target_image").filter(|v| !v.is_null()) {
        lines.push("Target Image:".to_string());
        lines.push(format!("  Path: {}", field(&target["path"])));
        lines.push(format!(
            "  Size: {} x {}",
            field(&target["width"]),
            field(&target["height"])
        ));
        if let Some(exif) = target.get("exif").filter(|v| !v.is_null()) {
            lines.push(format!(
                "  EXIF - Camera: {}",
                field(&exif["camera_model"])
            ));
            if exif["gps_latitude"].is_number() && exif["gps_longitude"].is_number() {
                lines.push(format!(
                    "  EXIF - GPS: {}, {}",
                    field(&exif["gps_latitude"]),
                    field(&exif["gps_longitude"])
                ));
            }
            if exif["focal_length_mm"].is_number() {
                lines.push(format!(
                    "  EXIF - Focal length: {}mm",
                    field(&exif["focal_length_mm"])
                ));
            }
        }
        lines.push(String::new());
    }

    lines.push(sub.clone());
    lines.push("CAMERA PARAMETERS".to_string());
    lines.push(sub.clone());
    let camera = &data["camera_params"];
    if camera.is_null() {
        lines.push("Not yet estimated.".to_string());
    } else {
        let position = &camera["position"];
        let rotation = &camera["rotation"];
        lines.push(format!(
            "Position: X={}, Y={}, Z={}",
            field(&position["x"]),
            field(&position["y"]),
            field(&position["z"])
        ));
        lines.push(format!(
            "Rotation: Omega={}, Phi={}, Kappa={}",
            field(&rotation["omega"]),
            field(&rotation["phi"]),
            field(&rotation["kappa"])
        ));
        lines.push(format!("FOV: {}", field(&camera["fov_deg"])));
    }
    lines.push(String::new());

    lines.push(sub.clone());
    lines.push("PROCESSING RESULTS".to_string());
    lines.push(sub);
    let result = &data["processing_result"];
    if let Some(metrics) = result.get("metrics").filter(|v| !v.is_null()) {
        lines.push("Quality Metrics:".to_string());
        lines.push(format!("  RMSE: {} pixels", field(&metrics["rmse"])));
        lines.push(format!("  Inliers: {}", field(&metrics["inlier_count"])));
        lines.push(format!("  Iterations: {}", field(&metrics["iterations"])));
        lines.push(String::new());
    }
    if let Some(gcps) = result.get("gcps").and_then(|v| v.as_array()) {
        lines.push("Ground Control Points:".to_string());
        lines.push("  Image (X, Y)          World (X, Y, Z)                   Confidence".to_string());
        for gcp in gcps {
            lines.push(format!(
                "  ({:>8.1}, {:>8.1})  ({:>10.2}, {:>10.2}, {:>8.2})  {}",
                gcp["image_x"].as_f64().unwrap_or(0.0),
                gcp["image_y"].as_f64().unwrap_or(0.0),
                gcp["world_x"].as_f64().unwrap_or(0.0),
                gcp["world_y"].as_f64().unwrap_or(0.0),
                gcp["world_z"].as_f64().unwrap_or(0.0),
                field(&gcp["confidence"])
            ));
        }
        lines.push(String::new());
    }
    if let Some(path) = result.get("geotiff_path").filter(|v| !v.is_null()) {
        lines.push(format!("Exported GeoTIFF: {}", field(path)));
        lines.push(String::new());
    }

    lines.push(rule.clone());
    lines.push("END OF REPORT".to_string());
    lines.push(rule);

    lines.join("\n")
}

/// Render one JSON leaf for the text report; null becomes "N/A".
fn field(value: &Value) -> String {
    match value {
        Value::Null => "N/A".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
