//! Best-effort staging outside the caller's request
//!
//! Every background artifact runs in its own task. A reporter task waits for
//! it, persists any failure next to the build directory and posts the result
//! on a channel drained by [`BackgroundQueue::next`]. Failures, panics
//! included, never reach the caller that scheduled the work.

use crate::artifact::{process, ArtifactHandler, StageContext};
use crate::cache::{ErrorRecord, ErrorStore};
use crate::error::DevstageError;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// State of a background staging attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Done,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One background staging attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackgroundJob {
    pub id: Uuid,
    pub artifact: String,
    pub build_dir: PathBuf,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Spawns background stages and collects their results
pub struct BackgroundQueue {
    tx: mpsc::UnboundedSender<BackgroundJob>,
    rx: Mutex<mpsc::UnboundedReceiver<BackgroundJob>>,
    outstanding: Arc<AtomicUsize>,
}

impl BackgroundQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            outstanding: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Stage `handler` in a new task under a shared lock on `build_dir`
    pub fn spawn(
        &self,
        handler: Box<dyn ArtifactHandler>,
        ctx: StageContext,
        build_dir: PathBuf,
        errors: ErrorStore,
    ) -> BackgroundJob {
        let job = BackgroundJob {
            id: Uuid::new_v4(),
            artifact: handler.name().to_string(),
            build_dir: build_dir.clone(),
            status: JobStatus::Pending,
            error: None,
        };
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        debug!("Scheduling {} ({}) in the background", job.artifact, job.id);

        let work_errors = errors.clone();
        let work = tokio::spawn(async move {
            let _build = ctx.locks.build_shared(&build_dir).await;
            work_errors.clear(handler.name()).await?;
            process(handler.as_ref(), &ctx).await
        });

        let tx = self.tx.clone();
        let mut result = job.clone();
        tokio::spawn(async move {
            let failure = match work.await {
                Ok(Ok(staged)) => {
                    info!("Background stage of {} finished", staged.name);
                    None
                }
                Ok(Err(e)) => Some(e),
                Err(join_err) => Some(DevstageError::Internal(format!(
                    "background worker for {} stopped: {}",
                    result.artifact, join_err
                ))),
            };

            match failure {
                None => result.status = JobStatus::Done,
                Some(e) => {
                    warn!("Background stage of {} failed: {}", result.artifact, e);
                    let record = ErrorRecord::from_error(&result.artifact, &e);
                    if let Err(save_err) = errors.save(&record).await {
                        warn!("Could not record failure of {}: {}", result.artifact, save_err);
                    }
                    result.status = JobStatus::Failed;
                    result.error = Some(e.to_string());
                }
            }

            // Receiver lives as long as the queue; nothing to do if it is gone
            let _ = tx.send(result);
        });

        job
    }

    /// Wait for the next finished job; `None` when nothing is outstanding
    pub async fn next(&self) -> Option<BackgroundJob> {
        if self.outstanding.load(Ordering::SeqCst) == 0 {
            return None;
        }
        let job = self.rx.lock().await.recv().await?;
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        Some(job)
    }

    /// Jobs scheduled whose result has not been taken yet
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

impl Default for BackgroundQueue {
    fn default() -> Self {
        Self::new()
    }
}
