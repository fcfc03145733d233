//! Integration tests for project CRUD and archive save/load.

mod common;

use axum::http::StatusCode;
use common::{body_json, delete, get, post_json, put_json};
use serde_json::json;

async fn create_project(app: &common::TestApp, name: &str) -> serde_json::Value {
    let response = post_json(
        app.router.clone(),
        "/api/projects",
        json!({ "name": name }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

// ---------------------------------------------------------------------------
// Test: create then fetch a project
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_and_get_project() {
    let app = common::build_test_app();
    let created = create_project(&app, "valley survey").await;

    assert_eq!(created["name"], "valley survey");
    assert_eq!(created["status"], "draft");
    assert_eq!(created["version"], "1.0.0");

    let id = created["id"].as_str().unwrap();
    let response = get(app.router.clone(), &format!("/api/projects/{id}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let fetched = body_json(response).await;
    assert_eq!(fetched["data"]["id"], created["id"]);
}

// ---------------------------------------------------------------------------
// Test: empty name is rejected with 400
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_project_name_is_rejected() {
    let app = common::build_test_app();
    let response = post_json(app.router.clone(), "/api/projects", json!({ "name": "" })).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
}

// ---------------------------------------------------------------------------
// Test: unknown project returns 404 with the standard error body
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_project_returns_404() {
    let app = common::build_test_app();
    let response = get(
        app.router.clone(),
        "/api/projects/00000000-0000-0000-0000-000000000000",
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
    assert!(json["error"].as_str().unwrap().contains("Project"));
}

// ---------------------------------------------------------------------------
// Test: update patches only the provided fields
// ---------------------------------------------------------------------------

#[tokio::test]
async fn update_patches_name_and_inputs() {
    let app = common::build_test_app();
    let created = create_project(&app, "before").await;
    let id = created["id"].as_str().unwrap();

    let response = put_json(
        app.router.clone(),
        &format!("/api/projects/{id}"),
        json!({
            "name": "after",
            "input_data": serde_json::to_value(common::complete_inputs()).unwrap(),
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let updated = body_json(response).await;
    assert_eq!(updated["data"]["name"], "after");
    assert_eq!(
        updated["data"]["input_data"]["dsm"]["path"],
        "/data/site-dsm.tif"
    );
    // Status untouched by a partial update.
    assert_eq!(updated["data"]["status"], "draft");
}

// ---------------------------------------------------------------------------
// Test: list is ordered by most recent update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_orders_by_most_recent_update() {
    let app = common::build_test_app();
    let first = create_project(&app, "first").await;
    let _second = create_project(&app, "second").await;

    let first_id = first["id"].as_str().unwrap();
    put_json(
        app.router.clone(),
        &format!("/api/projects/{first_id}"),
        json!({ "name": "first touched" }),
    )
    .await;

    let response = get(app.router.clone(), "/api/projects").await;
    let json = body_json(response).await;
    let listed = json["data"].as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["name"], "first touched");
}

// ---------------------------------------------------------------------------
// Test: delete removes the project
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_removes_project() {
    let app = common::build_test_app();
    let created = create_project(&app, "doomed").await;
    let id = created["id"].as_str().unwrap();

    let response = delete(app.router.clone(), &format!("/api/projects/{id}")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = get(app.router.clone(), &format!("/api/projects/{id}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: save then load an archive through the endpoints
// ---------------------------------------------------------------------------

#[tokio::test]
async fn save_and_load_archive_round_trips() {
    let app = common::build_test_app();
    let created = create_project(&app, "archived").await;
    let id = created["id"].as_str().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("archived.photerra");

    let response = post_json(
        app.router.clone(),
        &format!("/api/projects/{id}/save"),
        json!({ "path": path.to_str().unwrap() }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Wipe it from memory, then load it back from disk.
    delete(app.router.clone(), &format!("/api/projects/{id}")).await;

    let response = post_json(
        app.router.clone(),
        "/api/projects/load",
        json!({ "path": path.to_str().unwrap() }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let loaded = body_json(response).await;
    assert_eq!(loaded["data"]["id"].as_str().unwrap(), id);
    assert_eq!(loaded["data"]["name"], "archived");
}

// ---------------------------------------------------------------------------
// Test: loading an archive with an unsupported version returns 400
// ---------------------------------------------------------------------------

#[tokio::test]
async fn load_rejects_unsupported_archive_version() {
    let app = common::build_test_app();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("old.photerra");
    std::fs::write(
        &path,
        json!({
            "version": "0.9.0",
            "saved_at": "2026-01-01T00:00:00Z",
            "project": {}
        })
        .to_string(),
    )
    .unwrap();

    let response = post_json(
        app.router.clone(),
        "/api/projects/load",
        json!({ "path": path.to_str().unwrap() }),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["error"].as_str().unwrap().contains("0.9.0"));
}

// ---------------------------------------------------------------------------
// Test: JSON report reflects the project's processed state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn report_json_reflects_processed_state() {
    let app = common::build_test_app();
    let created = create_project(&app, "ridge survey").await;
    let id = created["id"].as_str().unwrap().to_string();

    app.state
        .projects
        .update(id.parse().unwrap(), |project| {
            project.camera_params = Some(photerra_core::project::CameraParams {
                position: [5000.0, 6000.0, 550.0],
                rotation: [0.0, -12.0, 90.0],
                fov_deg: 58.0,
            });
            project.process_result = Some(photerra_core::project::ProcessResult {
                geotiff_path: Some("/out/ridge.tif".to_string()),
                gcps: Vec::new(),
                metrics: Some(photerra_core::project::ProcessMetrics {
                    rmse: Some(1.4),
                    inlier_count: Some(42),
                    iterations: Some(12),
                    elapsed_secs: Some(3.5),
                }),
                completed_at: Some(chrono::Utc::now()),
            });
        })
        .await
        .unwrap();

    let response = get(app.router.clone(), &format!("/api/projects/{id}/report")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/json"));

    let report = body_json(response).await;
    assert_eq!(report["project"]["name"], "ridge survey");
    assert_eq!(report["camera_params"]["fov_deg"], 58.0);
    assert_eq!(report["processing_result"]["metrics"]["rmse"], 1.4);
    assert_eq!(report["processing_result"]["geotiff_path"], "/out/ridge.tif");
}

// ---------------------------------------------------------------------------
// Test: text report renders human-readable sections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn report_text_format_is_plain_text() {
    let app = common::build_test_app();
    let created = create_project(&app, "valley").await;
    let id = created["id"].as_str().unwrap();

    let response = get(
        app.router.clone(),
        &format!("/api/projects/{id}/report?format=text"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let report = common::body_text(response).await;
    assert!(report.contains("GEORECTIFICATION PROCESSING REPORT"));
    assert!(report.contains("Name: valley"));
}

// ---------------------------------------------------------------------------
// Test: report for an unknown project returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn report_unknown_project_returns_404() {
    let app = common::build_test_app();
    let response = get(
        app.router.clone(),
        &format!("/api/projects/{}/report", uuid::Uuid::new_v4()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: unsupported report format returns 400
// ---------------------------------------------------------------------------

#[tokio::test]
async fn report_rejects_unknown_format() {
    let app = common::build_test_app();
    let created = create_project(&app, "fmt").await;
    let id = created["id"].as_str().unwrap();

    let response = get(
        app.router.clone(),
        &format!("/api/projects/{id}/report?format=xml"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
    assert!(json["error"].as_str().unwrap().contains("xml"));
}
