//! Scheduler (C6): admits queued jobs onto the worker pool respecting the
//! global and per-tool-class concurrency caps, drives execution through the
//! uniform [`ArtifactWorker`] contract, and retires finished jobs.
//!
//! Admission, not a `tokio::Semaphore`, is the right model here because the
//! three constraints (global cap, per-tool cap, at-most-one-claim-per-file)
//! interact: a permit can exist in one dimension and not another. The
//! scheduler instead keeps its own counters and re-scans the queue whenever
//! something changes that might free up a slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::artifact::ToolClass;
use crate::config::RuntimeConfig;
use crate::error::{CoreError, Result};
use crate::events::{EventBus, JobEvent, JobEventBody};
use crate::jobs::{Job, JobId, JobState, JobStore};
use crate::media::MediaFile;
use crate::paths::Resolver;
use crate::worker::{ProgressReporter, WorkerContext, WorkerRegistry};

pub struct Scheduler {
    store: Arc<JobStore>,
    registry: Arc<WorkerRegistry>,
    resolver: Arc<Resolver>,
    events: EventBus,
    config: RwLock<RuntimeConfig>,
    paused: AtomicBool,
    running_total: AtomicUsize,
    running_by_class: DashMap<ToolClass, usize>,
    tokens: DashMap<JobId, CancellationToken>,
    notify: Notify,
}

impl Scheduler {
    pub fn new(
        store: Arc<JobStore>,
        registry: Arc<WorkerRegistry>,
        resolver: Arc<Resolver>,
        events: EventBus,
        config: RuntimeConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            registry,
            resolver,
            events,
            config: RwLock::new(config),
            paused: AtomicBool::new(false),
            running_total: AtomicUsize::new(0),
            running_by_class: DashMap::new(),
            tokens: DashMap::new(),
            notify: Notify::new(),
        })
    }

    /// Spawns the scheduling loop. Call once at startup; the returned
    /// handle runs until the process shuts down (the loop has no exit
    /// condition, matching a long-lived daemon service).
    pub fn spawn_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                scheduler.notify.notified().await;
                scheduler.try_admit();
            }
        })
    }

    /// Wakes the scheduling loop — call after enqueuing jobs, on
    /// completion, on pause/resume, and on concurrency reconfiguration.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.wake();
    }

    pub fn set_global_max_concurrency(&self, n: usize) -> Result<()> {
        self.config.write().set_global_max_concurrency(n)?;
        self.wake();
        Ok(())
    }

    pub fn set_tool_cap(&self, class: ToolClass, cap: usize) {
        self.config.write().set_tool_cap(class, cap);
        self.wake();
    }

    pub fn config_snapshot(&self) -> RuntimeConfig {
        self.config.read().clone()
    }

    /// Cancels a job. Queued jobs are canceled immediately and
    /// synchronously; active jobs are signaled cooperatively and are given
    /// `cancel_grace` to exit before the executor force-finishes them.
    pub fn cancel(&self, id: JobId) -> Result<()> {
        let job = self.store.get(id).ok_or_else(|| CoreError::not_found(format!("job {id} not found")))?;
        if job.state == JobState::Queued {
            self.store.transition(id, JobState::Canceled)?;
            self.publish(&self.store.get(id).unwrap(), JobEvent::Canceled);
            self.wake();
            return Ok(());
        }
        if let Some(token) = self.tokens.get(&id) {
            token.cancel();
        }
        Ok(())
    }

    pub fn cancel_queued_all(&self) -> Vec<JobId> {
        let ids = self.store.cancel_queued_all();
        for id in &ids {
            if let Some(job) = self.store.get(*id) {
                self.publish(&job, JobEvent::Canceled);
            }
        }
        ids
    }

    pub fn cancel_all_active(&self) -> Vec<JobId> {
        let ids = self.store.active_job_ids();
        for id in &ids {
            if let Some(token) = self.tokens.get(id) {
                token.cancel();
            }
        }
        ids
    }

    fn class_cap(&self, class: ToolClass) -> usize {
        self.config.read().tool_cap(class)
    }

    fn global_cap(&self) -> usize {
        self.config.read().global_max_concurrency
    }

    fn running_in_class(&self, class: ToolClass) -> usize {
        self.running_by_class.get(&class).map(|v| *v).unwrap_or(0)
    }

    /// Scans the queue in FIFO (creation, then id) order and admits every
    /// job that currently satisfies all three admission constraints,
    /// re-checking live counters as it goes so a burst of admissions in one
    /// tool class doesn't starve a later scan within the same pass.
    fn try_admit(self: &Arc<Self>) {
        if self.is_paused() {
            return;
        }
        let queued = self.store.list_by_state(JobState::Queued);
        for job in queued {
            if self.running_total.load(Ordering::SeqCst) >= self.global_cap() {
                break;
            }
            let class = job.artifact.tool_class();
            if self.running_in_class(class) >= self.class_cap(class) {
                continue;
            }
            if let Some((target, kind)) = job.claim_key() {
                let conflict = self
                    .store
                    .active_on(&target, kind)
                    .into_iter()
                    .any(|other| other.id != job.id && other.state.is_active());
                if conflict {
                    continue;
                }
            }
            self.admit(job);
        }
    }

    fn admit(self: &Arc<Self>, job: Job) {
        let id = job.id;
        let class = job.artifact.tool_class();
        if self.store.transition(id, JobState::Starting).is_err() {
            return;
        }
        self.running_total.fetch_add(1, Ordering::SeqCst);
        *self.running_by_class.entry(class).or_insert(0) += 1;

        let token = CancellationToken::new();
        self.tokens.insert(id, token.clone());

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.execute(job, token).await;
        });
    }

    async fn execute(self: Arc<Self>, job: Job, cancel: CancellationToken) {
        let id = job.id;
        let class = job.artifact.tool_class();

        if let Some(current) = self.store.get(id) {
            self.publish(&current, JobEvent::Started);
        }

        let outcome = self.run_job(&job, cancel.clone()).await;

        let final_state = match &outcome {
            Ok(_) if cancel.is_cancelled() => JobState::Canceled,
            Ok(_) => JobState::Completed,
            Err(e) if e.code == "canceled" => JobState::Canceled,
            Err(_) => JobState::Failed,
        };

        match &outcome {
            Ok(value) => {
                let _ = self.store.set_result(id, value.clone());
            }
            Err(e) => {
                // "timeout" must be the literal error value, not the
                // human-readable message the subprocess layer attaches to it.
                let message = if e.code == "timeout" { e.code.to_string() } else { e.message.clone() };
                let _ = self.store.set_error(id, message);
            }
        }

        if let Ok(updated) = self.store.transition(id, final_state) {
            let event = match final_state {
                JobState::Completed => JobEvent::Finished,
                JobState::Canceled => JobEvent::Canceled,
                JobState::Failed => JobEvent::Error,
                _ => JobEvent::Finished,
            };
            // The cache invalidator subscribes to this same event to keep
            // C3/C9 fresh; the scheduler doesn't touch either cache directly.
            self.publish(&updated, event);
        }

        self.tokens.remove(&id);
        self.running_total.fetch_sub(1, Ordering::SeqCst);
        if let Some(mut count) = self.running_by_class.get_mut(&class) {
            *count = count.saturating_sub(1);
        }
        self.wake();
    }

    async fn run_job(
        &self,
        job: &Job,
        cancel: CancellationToken,
    ) -> std::result::Result<serde_json::Value, crate::worker::WorkerError> {
        let worker = self
            .registry
            .get(job.artifact)
            .ok_or_else(|| crate::worker::WorkerError::new("internal", "no worker registered for kind"))?;

        let target = job.target.clone().ok_or_else(|| {
            crate::worker::WorkerError::new("invalid-input", "job has no target file")
        })?;
        let file = MediaFile::new(&target);

        // Scratch dir lives under the media root (not the system temp dir) so
        // the atomic-publish rename in `WorkerContext::publish` never crosses
        // a filesystem boundary into the sidecar's destination volume.
        let scratch_root = self.resolver.root().join(".reelforge-tmp");
        std::fs::create_dir_all(&scratch_root)
            .map_err(|e| crate::worker::WorkerError::new("internal", e.to_string()))?;
        let workspace = tempfile::Builder::new()
            .prefix(".job-")
            .tempdir_in(&scratch_root)
            .map_err(|e| crate::worker::WorkerError::new("internal", e.to_string()))?;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timeout = self.config.read().timeout_for(job.artifact.tool_class());
        let ctx = WorkerContext::new(cancel.clone(), ProgressReporter::new(tx), workspace, timeout);

        if let Err(_) = self.store.transition(job.id, JobState::Running) {
            // Canceled out from under us between Starting and Running.
            return Err(crate::worker::WorkerError::new("canceled", "canceled before running"));
        }
        if let Some(current) = self.store.get(job.id) {
            self.publish(&current, JobEvent::Current);
        }

        let job_id = job.id;
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        let task_name = job.task.clone();
        let artifact = job.artifact;
        let file_name = job.target.clone();
        let progress_forwarder = tokio::spawn(async move {
            let mut last_emit = Instant::now() - Duration::from_millis(300);
            while let Some(update) = rx.recv().await {
                let _ = store.set_progress(job_id, update.processed, update.total);
                if last_emit.elapsed() < Duration::from_millis(250) {
                    continue;
                }
                last_emit = Instant::now();
                if let Some(current) = store.get(job_id) {
                    events.publish(JobEvent::Progress(JobEventBody {
                        job_id,
                        task: task_name.clone(),
                        artifact,
                        file: file_name.clone(),
                        state: current.state,
                        progress: current.progress,
                        error: update.note,
                        ts: Utc::now(),
                    }));
                }
            }
        });

        let cancel_grace = self.config.read().cancel_grace;
        let run_fut = worker.run(&ctx, &self.resolver, &file, &job.params);
        tokio::pin!(run_fut);
        let forced_cancel = async {
            cancel.cancelled().await;
            tokio::time::sleep(cancel_grace).await;
        };
        let outcome = tokio::select! {
            res = &mut run_fut => res,
            _ = forced_cancel => {
                warn!(job_id = %job_id, "forcing job cancellation after grace window elapsed");
                Err(crate::worker::WorkerError::new("canceled", "forced cancellation after grace window"))
            }
        };

        drop(ctx);
        let _ = progress_forwarder.await;
        outcome
    }

    fn publish(&self, job: &Job, make: fn(JobEventBody) -> JobEvent) {
        let body = JobEventBody {
            job_id: job.id,
            task: job.task.clone(),
            artifact: job.artifact,
            file: job.target.clone(),
            state: job.state,
            progress: job.progress,
            error: job.error.clone(),
            ts: Utc::now(),
        };
        info!(job_id = %job.id, artifact = %job.artifact, state = %job.state, "job event");
        self.events.publish(make(body));
    }
}

/// Snapshot of live scheduler occupancy, surfaced through the tasks API.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SchedulerStatus {
    pub paused: bool,
    pub running_total: usize,
    pub global_max_concurrency: usize,
    pub running_by_class: HashMap<ToolClass, usize>,
    pub tool_caps: HashMap<ToolClass, usize>,
}

impl Scheduler {
    pub fn status(&self) -> SchedulerStatus {
        let config = self.config.read();
        SchedulerStatus {
            paused: self.is_paused(),
            running_total: self.running_total.load(Ordering::SeqCst),
            global_max_concurrency: config.global_max_concurrency,
            running_by_class: ToolClass::ALL.iter().map(|c| (*c, self.running_in_class(*c))).collect(),
            tool_caps: ToolClass::ALL.iter().map(|c| (*c, config.tool_cap(*c))).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{WorkerError, WorkerOutcome};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    /// A worker that blocks on a shared [`Notify`] until released, so tests
    /// can observe "currently running" state deterministically instead of
    /// racing a real subprocess.
    struct GatedWorker {
        kind: crate::artifact::ArtifactKind,
        gate: Arc<Notify>,
        started: Arc<StdAtomicUsize>,
    }

    #[async_trait]
    impl crate::worker::ArtifactWorker for GatedWorker {
        fn kind(&self) -> crate::artifact::ArtifactKind {
            self.kind
        }

        fn validate(&self, params: &serde_json::Value) -> std::result::Result<serde_json::Value, WorkerError> {
            Ok(params.clone())
        }

        async fn run(
            &self,
            _ctx: &WorkerContext,
            _resolver: &Resolver,
            _file: &MediaFile,
            _params: &serde_json::Value,
        ) -> WorkerOutcome {
            self.started.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(json!({}))
        }
    }

    fn harness(global_max: usize) -> (Arc<Scheduler>, Arc<JobStore>, Arc<Notify>, Arc<StdAtomicUsize>) {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Arc::new(Resolver::new(dir.path()));
        let store = Arc::new(JobStore::new());
        let gate = Arc::new(Notify::new());
        let started = Arc::new(StdAtomicUsize::new(0));

        let mut registry = WorkerRegistry::new();
        registry.register(Arc::new(GatedWorker {
            kind: crate::artifact::ArtifactKind::Phash,
            gate: gate.clone(),
            started: started.clone(),
        }));
        registry.register(Arc::new(GatedWorker {
            kind: crate::artifact::ArtifactKind::Metadata,
            gate: gate.clone(),
            started: started.clone(),
        }));

        let events = EventBus::new(16);
        let mut config = RuntimeConfig::default();
        config.global_max_concurrency = global_max;

        let scheduler = Scheduler::new(store.clone(), Arc::new(registry), resolver, events, config);
        (scheduler, store, gate, started)
    }

    async fn wait_until(mut cond: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cond()
    }

    #[tokio::test]
    async fn global_cap_admits_only_up_to_the_configured_limit() {
        let (scheduler, store, gate, started) = harness(1);
        let a = store.enqueue(Job::new(crate::artifact::ArtifactKind::Phash, Some("a.mp4".into()), json!({})));
        let b = store.enqueue(Job::new(crate::artifact::ArtifactKind::Metadata, Some("b.mp4".into()), json!({})));

        scheduler.try_admit();
        assert!(wait_until(|| started.load(Ordering::SeqCst) == 1, Duration::from_millis(500)).await);
        assert_eq!(scheduler.running_total.load(Ordering::SeqCst), 1);
        // Second job has a free tool-class slot but the global cap is 1; it
        // must stay queued until the first releases its slot.
        assert_eq!(store.get(b).unwrap().state, JobState::Queued);

        gate.notify_waiters();
        assert!(wait_until(|| store.get(a).unwrap().state == JobState::Completed, Duration::from_millis(500)).await);
        scheduler.try_admit();
        assert!(wait_until(|| started.load(Ordering::SeqCst) == 2, Duration::from_millis(500)).await);

        gate.notify_waiters();
        assert!(wait_until(|| store.get(b).unwrap().state == JobState::Completed, Duration::from_millis(500)).await);
        assert_eq!(scheduler.running_total.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn claim_blocks_a_second_job_on_the_same_target_and_kind() {
        let (scheduler, store, gate, started) = harness(4);
        let first = store.enqueue(Job::new(crate::artifact::ArtifactKind::Phash, Some("a.mp4".into()), json!({})));
        let second = store.enqueue(Job::new(crate::artifact::ArtifactKind::Phash, Some("a.mp4".into()), json!({})));

        scheduler.try_admit();
        assert!(wait_until(|| started.load(Ordering::SeqCst) == 1, Duration::from_millis(500)).await);
        // Same (file, kind) as the running job: must not be admitted even
        // though both the global cap and the tool-class cap have headroom.
        assert_eq!(store.get(second).unwrap().state, JobState::Queued);

        gate.notify_waiters();
        assert!(wait_until(|| store.get(first).unwrap().state == JobState::Completed, Duration::from_millis(500)).await);
        scheduler.try_admit();
        assert!(wait_until(|| started.load(Ordering::SeqCst) == 2, Duration::from_millis(500)).await);
        gate.notify_waiters();
        assert!(wait_until(|| store.get(second).unwrap().state == JobState::Completed, Duration::from_millis(500)).await);
    }

    #[tokio::test]
    async fn pause_prevents_new_admissions() {
        let (scheduler, store, _gate, started) = harness(4);
        scheduler.pause();
        store.enqueue(Job::new(crate::artifact::ArtifactKind::Phash, Some("a.mp4".into()), json!({})));

        scheduler.try_admit();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(started.load(Ordering::SeqCst), 0);

        scheduler.resume();
        scheduler.try_admit();
        assert!(wait_until(|| started.load(Ordering::SeqCst) == 1, Duration::from_millis(500)).await);
    }
}
