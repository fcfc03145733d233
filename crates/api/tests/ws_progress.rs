//! Integration tests for the job progress WebSocket.
//!
//! These drive a real upgraded socket against the production router served
//! on an ephemeral port, verifying the framing contract end to end: the
//! unknown-id close, the connect snapshot, per-update frames, and the single
//! terminal frame.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use common::{body_json, post_json, put_json, FakeEngine};
use futures::StreamExt;
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the test router on an ephemeral port.
async fn serve(app: &common::TestApp) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, job_id: &str) -> ClientSocket {
    let (socket, _response) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/api/jobs/{job_id}/ws"))
            .await
            .expect("websocket upgrade");
    socket
}

/// Read frames until the server closes, returning the parsed text frames
/// and the close code (if the close carried one).
async fn collect_frames(mut socket: ClientSocket) -> (Vec<serde_json::Value>, Option<u16>) {
    let mut frames = Vec::new();
    let mut close_code = None;
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("websocket went quiet without closing");
        match message {
            Some(Ok(Message::Text(text))) => {
                frames.push(serde_json::from_str(&text).unwrap());
            }
            Some(Ok(Message::Close(frame))) => {
                close_code = frame.map(|f| u16::from(f.code));
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => panic!("websocket error: {e}"),
            None => break,
        }
    }
    (frames, close_code)
}

async fn ready_project(app: &common::TestApp) -> String {
    let response = post_json(
        app.router.clone(),
        "/api/projects",
        json!({ "name": "survey" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = body_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = put_json(
        app.router.clone(),
        &format!("/api/projects/{id}"),
        json!({ "input_data": serde_json::to_value(common::complete_inputs()).unwrap() }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    id
}

async fn start_process(app: &common::TestApp, project_id: &str) -> String {
    let response = post_json(
        app.router.clone(),
        "/api/georectify/process",
        json!({ "project_id": project_id }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    body_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string()
}

// ---------------------------------------------------------------------------
// Test: unknown job id gets one error frame, then close code 4004
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_job_gets_error_frame_and_close_4004() {
    let app = common::build_test_app();
    let addr = serve(&app).await;

    let socket = connect(addr, &uuid::Uuid::new_v4().to_string()).await;
    let (frames, close_code) = collect_frames(socket).await;

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["error"], "Job not found");
    assert!(frames[0]["job_id"].is_string());
    assert_eq!(close_code, Some(4004));
}

// ---------------------------------------------------------------------------
// Test: a completing job streams snapshot, updates, one terminal frame
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completed_job_streams_exactly_one_terminal_frame() {
    let app = common::build_test_app_with_engine(Some(Arc::new(FakeEngine::slow(
        Duration::from_millis(100),
    ))));
    let addr = serve(&app).await;
    let project_id = ready_project(&app).await;
    let job_id = start_process(&app, &project_id).await;

    let socket = connect(addr, &job_id).await;
    let (frames, _close_code) = collect_frames(socket).await;

    // Snapshot first, terminal last, running updates in between.
    assert!(frames.len() >= 2, "got {frames:?}");
    assert!(frames[0]["status"].is_string());
    assert!(frames[0]["progress"].is_number());

    let terminal = frames.last().unwrap();
    assert_eq!(terminal["status"], "completed");
    assert_eq!(terminal["step"], "finished");
    assert_eq!(terminal["progress"], 1.0);
    assert_eq!(terminal["message"], "Processing complete");
    assert_eq!(terminal["result"]["gcp_count"], 1);

    // Only the terminal frame carries a result.
    let with_result = frames.iter().filter(|f| f.get("result").is_some()).count();
    assert_eq!(with_result, 1);

    for frame in &frames[1..frames.len() - 1] {
        assert_eq!(frame["status"], "running");
    }
}

// ---------------------------------------------------------------------------
// Test: a failed job's terminal frame carries the error and no result
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_job_terminal_frame_has_error_and_no_result() {
    let app = common::build_test_app_with_engine(Some(Arc::new(FakeEngine::failing_at(
        "estimate",
    ))));
    let addr = serve(&app).await;
    let project_id = ready_project(&app).await;
    let job_id = start_process(&app, &project_id).await;

    let socket = connect(addr, &job_id).await;
    let (frames, _close_code) = collect_frames(socket).await;

    let terminal = frames.last().unwrap();
    assert_eq!(terminal["status"], "failed");
    assert!(terminal["message"].as_str().unwrap().contains("estimate"));
    assert!(terminal.get("result").is_none());
}

// ---------------------------------------------------------------------------
// Test: a disconnecting client never leaks its observer registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn client_disconnect_removes_observer() {
    let app = common::build_test_app_with_engine(Some(Arc::new(FakeEngine::slow(
        Duration::from_secs(30),
    ))));
    let addr = serve(&app).await;
    let project_id = ready_project(&app).await;
    let job_id = start_process(&app, &project_id).await;
    let job = app
        .state
        .jobs
        .get(job_id.parse().unwrap())
        .await
        .expect("job registered");

    let mut socket = connect(addr, &job_id).await;

    // Wait for the snapshot frame; the observer is registered by then.
    let snapshot = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("no snapshot frame")
        .unwrap()
        .unwrap();
    assert!(matches!(snapshot, Message::Text(_)));
    assert_eq!(job.progress_observer_count(), 1);

    socket.close(None).await.unwrap();
    drop(socket);

    // The drain loop must notice the disconnect and deregister.
    for _ in 0..300 {
        if job.progress_observer_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(job.progress_observer_count(), 0);

    // Don't leave the slow job running behind the test.
    app.state.jobs.cancel(job.id()).await.unwrap();
}
