//! Shared helpers for API integration tests.
//!
//! Builds the production router (via `build_app_router`, so the full
//! middleware stack is exercised) over temp-dir stores and an in-process
//! fake engine.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use photerra_api::config::ServerConfig;
use photerra_api::router::build_app_router;
use photerra_api::state::AppState;
use photerra_core::engine::{
    EstimateOutcome, EstimateSpec, ExportOutcome, ExportSpec, GeorectifyEngine, MatchOutcome,
    MatchSpec, RectifyOutcome, RectifySpec,
};
use photerra_core::error::CoreError;
use photerra_core::jobs::JobQueue;
use photerra_core::match_cache::MatchCache;
use photerra_core::project::{
    CameraParams, Gcp, ImageFile, InputData, ProcessMetrics, RasterFile,
};
use photerra_core::recovery::RecoveryStore;

/// An in-process engine: instant by default, configurable to sleep (for
/// cancellation tests) or fail at a chosen operation.
pub struct FakeEngine {
    pub delay: Duration,
    pub fail_operation: Option<&'static str>,
}

impl FakeEngine {
    pub fn instant() -> Self {
        Self {
            delay: Duration::ZERO,
            fail_operation: None,
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            fail_operation: None,
        }
    }

    pub fn failing_at(operation: &'static str) -> Self {
        Self {
            delay: Duration::ZERO,
            fail_operation: Some(operation),
        }
    }

    async fn step(&self, operation: &'static str) -> Result<(), CoreError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_operation == Some(operation) {
            return Err(CoreError::processing(operation, "engine failure (test)"));
        }
        Ok(())
    }
}

#[async_trait]
impl GeorectifyEngine for FakeEngine {
    async fn match_images(&self, _spec: MatchSpec) -> Result<MatchOutcome, CoreError> {
        self.step("match").await?;
        Ok(MatchOutcome {
            gcps: vec![Gcp {
                image_x: 100.0,
                image_y: 200.0,
                world_x: 5000.0,
                world_y: 6000.0,
                world_z: 450.0,
                confidence: Some(0.92),
            }],
            match_count: 1,
            metrics: None,
        })
    }

    async fn estimate(&self, _spec: EstimateSpec) -> Result<EstimateOutcome, CoreError> {
        self.step("estimate").await?;
        Ok(EstimateOutcome {
            camera: CameraParams {
                position: [5000.0, 6000.0, 550.0],
                rotation: [0.0, -12.0, 90.0],
                fov_deg: 58.0,
            },
            metrics: ProcessMetrics {
                rmse: Some(1.4),
                inlier_count: Some(1),
                iterations: Some(12),
                elapsed_secs: Some(0.01),
            },
        })
    }

    async fn rectify(&self, spec: RectifySpec) -> Result<RectifyOutcome, CoreError> {
        self.step("rectify").await?;
        Ok(RectifyOutcome {
            raster_path: spec
                .output_path
                .unwrap_or_else(|| "/tmp/rectified.tif".to_string()),
            bounds: None,
        })
    }

    async fn export_geotiff(&self, spec: ExportSpec) -> Result<ExportOutcome, CoreError> {
        self.step("export").await?;
        Ok(ExportOutcome {
            path: spec.output_path,
            size_bytes: Some(1024),
        })
    }
}

/// Router plus direct handles on the shared stores, so tests can seed and
/// inspect state without going through HTTP.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _temp: TempDir,
}

pub fn test_config(temp: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        max_concurrent_jobs: 1,
        job_timeout_secs: 3600,
        temp_dir: temp.join("scratch"),
        recovery_dir: temp.join("recovery"),
        engine_command: None,
    }
}

pub fn build_test_app() -> TestApp {
    build_test_app_with_engine(Some(Arc::new(FakeEngine::instant())))
}

pub fn build_test_app_with_engine(engine: Option<Arc<dyn GeorectifyEngine>>) -> TestApp {
    let temp = TempDir::new().expect("temp dir");
    let config = test_config(temp.path());

    let state = AppState {
        jobs: Arc::new(JobQueue::new(config.max_concurrent_jobs)),
        projects: Arc::new(photerra_core::project::ProjectStore::new()),
        recovery: Arc::new(RecoveryStore::new(config.recovery_dir.clone()).expect("recovery dir")),
        match_cache: Arc::new(MatchCache::new(Some(config.temp_dir.join("match_cache")))),
        engine,
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        _temp: temp,
    }
}

/// Complete input data pointing at plausible (nonexistent) files; the fake
/// engine never touches disk.
pub fn complete_inputs() -> InputData {
    InputData {
        dsm: Some(RasterFile {
            path: "/data/site-dsm.tif".to_string(),
            crs: Some("EPSG:32633".to_string()),
            bounds: None,
            resolution: Some(0.5),
        }),
        ortho: Some(RasterFile {
            path: "/data/site-ortho.tif".to_string(),
            crs: Some("EPSG:32633".to_string()),
            bounds: None,
            resolution: Some(0.25),
        }),
        target_image: Some(ImageFile {
            path: "/data/photo.jpg".to_string(),
            width: Some(6000),
            height: Some(4000),
            exif: None,
        }),
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send_json(app, "POST", uri, body).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send_json(app, "PUT", uri, body).await
}

async fn send_json(
    app: Router,
    method: &str,
    uri: &str,
    body: serde_json::Value,
) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Poll `GET /api/jobs/{id}` until the job reaches a terminal status.
/// Panics after ~5 seconds.
pub async fn wait_for_terminal(app: &TestApp, job_id: &str) -> serde_json::Value {
    for _ in 0..500 {
        let response = get(app.router.clone(), &format!("/api/jobs/{job_id}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let status = json["data"]["status"].as_str().unwrap().to_string();
        if matches!(status.as_str(), "completed" | "failed" | "cancelled") {
            return json["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} never reached a terminal status");
}
