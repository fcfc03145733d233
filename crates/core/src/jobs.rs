//! In-memory asynchronous job queue.
//!
//! A [`Job`] tracks the lifecycle of one unit of background work: status,
//! progress, cancellation, and a result or error once it finishes. The
//! [`JobQueue`] owns all jobs, bounds how many run at once with a fair
//! semaphore, and supervises each job's task so work-function failures
//! never escape into the rest of the process.
//!
//! Cancellation is two-tier: `check_cancellation` gives work functions a
//! cooperative poll point, and the supervisor additionally races the work
//! future against the cancellation token, so a job blocked inside an await
//! that never polls the flag is still unwound at its current suspension
//! point.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

/// Error message stored on a job that was cancelled. Fixed so clients can
/// rely on it.
const CANCELLED_MESSAGE: &str = "Job was cancelled";

/// Job execution status. Transitions are strictly forward-moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Lowercase wire representation, matching the serde rename.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

/// One progress update delivered to observers.
#[derive(Debug, Clone, Serialize)]
pub struct JobProgress {
    /// Ratio in `[0.0, 1.0]`, already clamped.
    pub progress: f64,
    /// Current pipeline step name (e.g. "matching", "optimizing").
    pub step: String,
    /// Human-readable status message, replaced on each update.
    pub message: String,
}

/// Handle returned by [`Job::add_progress_callback`], used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Progress observers may fail; failures are logged and never propagate to
/// the job that emitted the update.
pub type ObserverResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type ProgressCallback = Arc<dyn Fn(&JobProgress) -> ObserverResult + Send + Sync>;

/// Serializable snapshot of a job's public state.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    pub step: String,
    pub message: String,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
}

/// Mutable job state, guarded by one mutex so readers always observe a
/// consistent snapshot.
struct JobInner {
    status: JobStatus,
    progress: f64,
    step: String,
    message: String,
    started_at: Option<Timestamp>,
    completed_at: Option<Timestamp>,
    error: Option<String>,
    result: Option<serde_json::Value>,
}

/// A tracked unit of asynchronous work.
///
/// Designed to be wrapped in `Arc` and shared between the supervising task
/// (the only writer of lifecycle state), HTTP handlers (readers), and
/// progress observers.
pub struct Job {
    id: JobId,
    created_at: Timestamp,
    cancel: CancellationToken,
    inner: Mutex<JobInner>,
    observers: Mutex<Vec<(ObserverId, ProgressCallback)>>,
    next_observer: AtomicU64,
    status_tx: watch::Sender<JobStatus>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl Job {
    /// Create a new job in `Pending` with a fresh random id.
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(JobStatus::Pending);
        Self {
            id: JobId::new_v4(),
            created_at: chrono::Utc::now(),
            cancel: CancellationToken::new(),
            inner: Mutex::new(JobInner {
                status: JobStatus::Pending,
                progress: 0.0,
                step: String::new(),
                message: String::new(),
                started_at: None,
                completed_at: None,
                error: None,
                result: None,
            }),
            observers: Mutex::new(Vec::new()),
            next_observer: AtomicU64::new(0),
            status_tx,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn status(&self) -> JobStatus {
        self.lock_inner().status
    }

    /// Consistent copy of the job's public state.
    pub fn snapshot(&self) -> JobSnapshot {
        let inner = self.lock_inner();
        JobSnapshot {
            id: self.id,
            status: inner.status,
            progress: inner.progress,
            step: inner.step.clone(),
            message: inner.message.clone(),
            created_at: self.created_at,
            started_at: inner.started_at,
            completed_at: inner.completed_at,
            error: inner.error.clone(),
            result: inner.result.clone(),
        }
    }

    /// Update progress (clamped to `[0.0, 1.0]`), replace step and message,
    /// then notify every observer in registration order.
    ///
    /// Observers are dispatched on a snapshot of the registry, so a callback
    /// may add or remove observers without corrupting the iteration. A
    /// failing observer is logged and does not prevent delivery to the rest.
    pub fn update_progress(&self, progress: f64, step: &str, message: &str) {
        let update = {
            let mut inner = self.lock_inner();
            inner.progress = progress.clamp(0.0, 1.0);
            inner.step = step.to_string();
            inner.message = message.to_string();
            JobProgress {
                progress: inner.progress,
                step: inner.step.clone(),
                message: inner.message.clone(),
            }
        };

        let callbacks: Vec<(ObserverId, ProgressCallback)> = self
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for (observer_id, callback) in callbacks {
            if let Err(e) = callback(&update) {
                tracing::warn!(
                    job_id = %self.id,
                    observer_id = observer_id.0,
                    error = %e,
                    "Progress callback failed",
                );
            }
        }
    }

    /// Cooperative cancellation poll point for work functions.
    ///
    /// Call this periodically inside long-running loops so cancellation is
    /// observed with bounded latency, not just at function entry.
    pub fn check_cancellation(&self) -> Result<(), CoreError> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        Ok(())
    }

    /// Request cancellation. Idempotent; ignored once the job is terminal.
    pub fn request_cancellation(&self) {
        if self.status().is_terminal() {
            return;
        }
        self.cancel.cancel();
    }

    /// Register a progress observer. Returns a handle for removal.
    pub fn add_progress_callback<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&JobProgress) -> ObserverResult + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_observer.fetch_add(1, Ordering::Relaxed));
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove a progress observer. Removing an unknown or already-removed
    /// id is a no-op.
    pub fn remove_progress_callback(&self, id: ObserverId) {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(observer_id, _)| *observer_id != id);
    }

    /// Number of currently registered progress observers.
    pub fn progress_observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Watch the job's status, e.g. to await the terminal transition.
    pub fn watch_status(&self) -> watch::Receiver<JobStatus> {
        self.status_tx.subscribe()
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait_terminal(&self) {
        let mut rx = self.watch_status();
        // The sender lives as long as this job, so wait_for cannot fail.
        let _ = rx.wait_for(|status| status.is_terminal()).await;
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, JobInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    fn set_running(&self) {
        {
            let mut inner = self.lock_inner();
            inner.status = JobStatus::Running;
            inner.started_at = Some(chrono::Utc::now());
        }
        let _ = self.status_tx.send(JobStatus::Running);
    }

    fn finish_completed(&self, result: serde_json::Value) {
        {
            let mut inner = self.lock_inner();
            inner.status = JobStatus::Completed;
            inner.progress = 1.0;
            inner.result = Some(result);
            inner.completed_at = Some(chrono::Utc::now());
        }
        let _ = self.status_tx.send(JobStatus::Completed);
    }

    fn finish_cancelled(&self) {
        {
            let mut inner = self.lock_inner();
            inner.status = JobStatus::Cancelled;
            inner.error = Some(CANCELLED_MESSAGE.to_string());
            inner.completed_at = Some(chrono::Utc::now());
        }
        let _ = self.status_tx.send(JobStatus::Cancelled);
    }

    fn finish_failed(&self, error: String) {
        {
            let mut inner = self.lock_inner();
            inner.status = JobStatus::Failed;
            inner.error = Some(error);
            inner.completed_at = Some(chrono::Utc::now());
        }
        let _ = self.status_tx.send(JobStatus::Failed);
    }
}

impl Default for Job {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a work function: an opaque JSON payload on success.
pub type JobResult = Result<serde_json::Value, CoreError>;

/// Boxed future returned by a work function.
pub type JobFuture = Pin<Box<dyn Future<Output = JobResult> + Send>>;

/// In-memory job queue with bounded concurrency.
///
/// The semaphore bounds *simultaneously executing* work, not submissions:
/// any number of `Pending` jobs may be queued, and they are admitted in
/// FIFO order as permits free up.
pub struct JobQueue {
    jobs: RwLock<HashMap<JobId, Arc<Job>>>,
    semaphore: Arc<Semaphore>,
}

impl JobQueue {
    /// Create a queue that runs at most `max_concurrent` jobs at once.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Submit a work function. Returns the job immediately; the job is
    /// visible via [`JobQueue::get`] before this returns, and execution
    /// starts whenever a concurrency slot frees up.
    pub async fn submit<F>(&self, work: F) -> Arc<Job>
    where
        F: FnOnce(Arc<Job>) -> JobFuture + Send + 'static,
    {
        let job = Arc::new(Job::new());
        self.jobs.write().await.insert(job.id(), Arc::clone(&job));

        let semaphore = Arc::clone(&self.semaphore);
        let supervised = Arc::clone(&job);
        tokio::spawn(async move {
            Self::supervise(supervised, semaphore, work).await;
        });

        tracing::info!(job_id = %job.id(), "Job submitted");
        job
    }

    /// Look up a job by id. Never blocks on job completion.
    pub async fn get(&self, id: JobId) -> Option<Arc<Job>> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Cancel a job.
    ///
    /// Unknown ids yield `NotFound`. Terminal jobs are returned unchanged.
    /// Otherwise the cancellation token is triggered (interrupting the work
    /// at its current suspension point if it is already running) and this
    /// waits for the job to reach its terminal state before returning.
    pub async fn cancel(&self, id: JobId) -> Result<Arc<Job>, CoreError> {
        let job = self
            .get(id)
            .await
            .ok_or_else(|| CoreError::not_found("Job", id))?;

        if job.status().is_terminal() {
            return Ok(job);
        }

        job.request_cancellation();
        job.wait_terminal().await;
        tracing::info!(job_id = %id, "Job cancellation observed");
        Ok(job)
    }

    /// Remove terminal jobs whose `completed_at` is older than `max_age`.
    /// Returns the number of jobs removed. Intended for periodic
    /// housekeeping; nothing calls it automatically.
    pub async fn cleanup_completed(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let Some(cutoff) = chrono::Utc::now().checked_sub_signed(max_age) else {
            // max_age is so large nothing can be older than it.
            return 0;
        };
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| {
            let snapshot = job.snapshot();
            !(snapshot.status.is_terminal()
                && snapshot.completed_at.is_some_and(|at| at < cutoff))
        });
        let removed = before - jobs.len();
        if removed > 0 {
            tracing::info!(removed, "Cleaned up completed jobs");
        }
        removed
    }

    /// Supervise one job from admission to terminal state. Work-function
    /// errors are converted into the job's terminal state and never escape.
    async fn supervise<F>(job: Arc<Job>, semaphore: Arc<Semaphore>, work: F)
    where
        F: FnOnce(Arc<Job>) -> JobFuture + Send + 'static,
    {
        // Admission control: the only point where a Pending job waits.
        // A job cancelled while queued never consumes a permit.
        let permit = tokio::select! {
            _ = job.cancel_token().cancelled() => {
                job.finish_cancelled();
                tracing::info!(job_id = %job.id(), "Job cancelled while queued");
                return;
            }
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    job.finish_failed("Job queue is shut down".to_string());
                    return;
                }
            },
        };

        job.set_running();
        tracing::info!(job_id = %job.id(), "Job started");

        let work_future = work(Arc::clone(&job));
        let outcome = tokio::select! {
            _ = job.cancel_token().cancelled() => Err(CoreError::Cancelled),
            outcome = work_future => outcome,
        };

        match outcome {
            Ok(result) => {
                job.finish_completed(result);
                tracing::info!(job_id = %job.id(), "Job completed");
            }
            Err(CoreError::Cancelled) => {
                job.finish_cancelled();
                tracing::info!(job_id = %job.id(), "Job cancelled");
            }
            Err(e) => {
                job.finish_failed(e.to_string());
                tracing::error!(job_id = %job.id(), error = %e, "Job failed");
            }
        }

        drop(permit);
    }
}
