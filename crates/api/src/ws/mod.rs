//! Per-job WebSocket progress streaming.

mod progress;

pub use progress::job_progress_ws;
