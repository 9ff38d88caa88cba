//! Subprocess management shared by every external-tool-backed producer.
//!
//! Spawn/wire/timeout/tree-kill belongs inside the worker, not the
//! scheduler — the scheduler only ever sees a future plus a cancellation
//! token. This module is that plumbing.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::WorkerError;

/// Runs `program args...` to completion, capturing stdout.
///
/// Cancellation checkpoints occur at least every 2 seconds of wall time
/// while the child runs. If `cancel` fires, the
/// child is killed and a `"canceled"` error is returned. If `timeout`
/// elapses first, the child is killed and a `"timeout"` error is returned.
/// A nonzero exit is a `"worker-runtime"` error.
pub async fn run_capturing_stdout(
    program: &str,
    args: &[String],
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, WorkerError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| WorkerError::new("tool-missing", format!("failed to spawn {program}: {e}")))?;

    let mut stdout_pipe = child.stdout.take().expect("piped stdout");
    let mut stderr_pipe = child.stderr.take().expect("piped stderr");
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    let deadline = timeout.map(|d| tokio::time::Instant::now() + d);
    let poll_interval = Duration::from_secs(2);

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => return Err(WorkerError::new("worker-runtime", e.to_string())),
        }

        let remaining = deadline.map(|d| d.saturating_duration_since(tokio::time::Instant::now()));
        if remaining == Some(Duration::ZERO) {
            let _ = child.kill().await;
            return Err(WorkerError::new("timeout", format!("{program} timed out")));
        }
        let wait_for = remaining.unwrap_or(poll_interval).min(poll_interval);

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(WorkerError::new("canceled", format!("{program} canceled")));
            }
            _ = tokio::time::sleep(wait_for) => {}
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    if status.success() {
        return Ok(stdout);
    }
    let stderr = stderr_task.await.unwrap_or_default();
    Err(WorkerError::new(
        "worker-runtime",
        format!("{program} exited with {status}: {}", String::from_utf8_lossy(&stderr)),
    ))
}

/// Runs `program args...` to completion without needing captured output —
/// used by producers whose result is a file the tool wrote directly.
pub async fn run_checked(
    program: &str,
    args: &[String],
    cancel: &CancellationToken,
    timeout: Option<Duration>,
) -> Result<(), WorkerError> {
    run_capturing_stdout(program, args, cancel, timeout).await.map(|_| ())
}
