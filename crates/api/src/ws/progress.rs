//! Progress streaming for a single job.
//!
//! Protocol, in order:
//!
//! 1. Unknown job id: one `{"error": "Job not found", "job_id": ...}` frame,
//!    then close with code 4004.
//! 2. On connect: one snapshot frame `{progress, step, message, status}`.
//! 3. While the job runs: one `{progress, step, message, status: "running"}`
//!    frame per progress update. Updates queue in an unbounded per-listener
//!    channel, so a slow client never blocks the worker.
//! 4. On terminal: exactly one final frame `{progress, step, message,
//!    status, result}` (result only on success), then a normal close.
//!
//! The drain loop wakes at least once a second even with no updates, so a
//! job that goes terminal without emitting progress still closes promptly.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;

use photerra_core::jobs::{Job, JobProgress, JobStatus};
use photerra_core::types::JobId;

use crate::state::AppState;

/// Close code sent for an unknown job id.
const CLOSE_UNKNOWN_JOB: u16 = 4004;

/// How long the drain loop waits for an update before re-checking whether
/// the job went terminal.
const DRAIN_TICK: Duration = Duration::from_secs(1);

/// GET /api/jobs/{id}/ws -- upgrade and stream progress for one job.
pub async fn job_progress_ws(
    Path(job_id): Path<JobId>,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_job(socket, state, job_id))
}

async fn stream_job(mut socket: WebSocket, state: AppState, job_id: JobId) {
    let Some(job) = state.jobs.get(job_id).await else {
        let error = json!({ "error": "Job not found", "job_id": job_id });
        let _ = socket.send(text_frame(&error)).await;
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_UNKNOWN_JOB,
                reason: Utf8Bytes::from_static("Job not found"),
            })))
            .await;
        return;
    };

    tracing::debug!(job_id = %job_id, "Progress stream connected");

    // Register the observer before the snapshot is taken, so no update can
    // fall between snapshot and subscription.
    let (tx, mut rx) = mpsc::unbounded_channel::<JobProgress>();
    let observer = job.add_progress_callback(move |update| {
        tx.send(update.clone())
            .map_err(|_| "progress listener channel closed".into())
    });

    let (mut sink, mut inbound) = socket.split();

    if sink.send(snapshot_frame(&job)).await.is_err() {
        job.remove_progress_callback(observer);
        return;
    }

    let client_gone = drain_updates(&job, &mut rx, &mut sink, &mut inbound).await;
    job.remove_progress_callback(observer);

    if client_gone {
        tracing::debug!(job_id = %job_id, "Progress stream client disconnected");
        return;
    }

    let _ = sink.send(terminal_frame(&job)).await;
    let _ = sink.send(Message::Close(None)).await;
    tracing::debug!(job_id = %job_id, "Progress stream finished");
}

/// Forward progress updates until the job is terminal or the client goes
/// away. Returns true when the client disconnected first.
async fn drain_updates(
    job: &Arc<Job>,
    rx: &mut mpsc::UnboundedReceiver<JobProgress>,
    sink: &mut SplitSink<WebSocket, Message>,
    inbound: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> bool {
    loop {
        if job.status().is_terminal() {
            return false;
        }

        tokio::select! {
            received = tokio::time::timeout(DRAIN_TICK, rx.recv()) => {
                match received {
                    Ok(Some(update)) => {
                        let frame = json!({
                            "progress": update.progress,
                            "step": update.step,
                            "message": update.message,
                            "status": JobStatus::Running.as_str(),
                        });
                        if sink.send(text_frame(&frame)).await.is_err() {
                            return true;
                        }
                    }
                    // Observer was removed out from under us; treat as done.
                    Ok(None) => return false,
                    // Quiet second; loop around and re-check terminal state.
                    Err(_) => {}
                }
            }
            message = inbound.next() => {
                match message {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return true,
                    // Clients only ever listen on this socket.
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// The initial frame: current state with placeholder step/message for a job
/// that has not produced an update yet.
fn snapshot_frame(job: &Job) -> Message {
    let snapshot = job.snapshot();
    let step = if snapshot.step.is_empty() {
        "pending".to_string()
    } else {
        snapshot.step
    };
    let message = if snapshot.message.is_empty() {
        "Waiting to start...".to_string()
    } else {
        snapshot.message
    };
    text_frame(&json!({
        "progress": snapshot.progress,
        "step": step,
        "message": message,
        "status": snapshot.status,
    }))
}

/// The final frame sent once the job is terminal.
fn terminal_frame(job: &Job) -> Message {
    let snapshot = job.snapshot();
    let success = snapshot.status == JobStatus::Completed;

    let step = if success {
        "finished".to_string()
    } else {
        snapshot.step
    };
    let message = match &snapshot.error {
        Some(error) => error.clone(),
        None => "Processing complete".to_string(),
    };

    let mut frame = json!({
        "progress": snapshot.progress,
        "step": step,
        "message": message,
        "status": snapshot.status,
    });
    if success {
        frame["result"] = snapshot.result.unwrap_or(serde_json::Value::Null);
    }
    text_frame(&frame)
}

fn text_frame(value: &serde_json::Value) -> Message {
    Message::Text(value.to_string().into())
}
