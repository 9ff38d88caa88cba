//! Per-job execution context handed to a worker's `run`.
//!
//! Bundles the pieces every producer needs regardless of what it actually
//! does: a cancellation signal, a progress callback, a scratch directory
//! that is guaranteed to be cleaned up, and an atomic-publish helper so a
//! partial write can never be observed as `present`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, Result};

/// One progress update as reported by a worker. The scheduler coalesces
/// these to at most 4/s per job before turning them into bus events;
/// workers are free to call `report` as often as is convenient.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub processed: u64,
    pub total: u64,
    pub note: Option<String>,
}

#[derive(Clone)]
pub struct ProgressReporter {
    tx: mpsc::UnboundedSender<ProgressUpdate>,
}

impl ProgressReporter {
    pub fn new(tx: mpsc::UnboundedSender<ProgressUpdate>) -> Self {
        Self { tx }
    }

    pub fn report(&self, processed: u64, total: u64, note: Option<String>) {
        // A dropped receiver (scheduler slot already torn down) is not the
        // worker's problem; reporting is best-effort.
        let _ = self.tx.send(ProgressUpdate { processed, total, note });
    }
}

/// Execution context passed to `ArtifactWorker::run`.
pub struct WorkerContext {
    cancel: CancellationToken,
    progress: ProgressReporter,
    workspace: Arc<tempfile::TempDir>,
    timeout: Option<Duration>,
}

impl WorkerContext {
    pub fn new(
        cancel: CancellationToken,
        progress: ProgressReporter,
        workspace: tempfile::TempDir,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            cancel,
            progress,
            workspace: Arc::new(workspace),
            timeout,
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The configured wall-clock limit for this job's tool class, per
    /// `RuntimeConfig::timeout_for` at the moment the job was admitted.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn report(&self, processed: u64, total: u64, note: Option<String>) {
        self.progress.report(processed, total, note);
    }

    pub fn workspace_dir(&self) -> &Path {
        self.workspace.path()
    }

    /// Atomically publishes a file written to a temp path into its final
    /// sidecar location. The rename is same-volume (the temp path lives
    /// under the workspace, which callers are expected to have created on
    /// the same filesystem as the media root) so the move is atomic: a
    /// reader of the final path only ever sees either nothing or the
    /// complete file.
    pub fn publish(&self, temp_path: &Path, final_path: &Path) -> Result<()> {
        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let meta = std::fs::metadata(temp_path)?;
        if meta.len() == 0 {
            return Err(CoreError::WorkerRuntime(format!(
                "refusing to publish zero-byte artifact at {}",
                temp_path.display()
            )));
        }
        std::fs::rename(temp_path, final_path)?;
        Ok(())
    }
}
