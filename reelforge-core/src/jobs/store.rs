//! Job Record Store (C5): the durable + in-memory store of [`Job`] records.
//!
//! Mutation only ever happens through `transition`, which enforces the
//! monotonic state graph declared on [`JobState`] — nothing else is allowed
//! to poke a job's state directly, which is what keeps the "at most one
//! active job per (path, kind)" invariant checkable from outside.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactKind;
use crate::error::{CoreError, Result};

use super::model::{Job, JobId, JobState};

#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

/// On-disk snapshot format used for the job store's persisted state.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    saved_at: DateTime<Utc>,
    jobs: Vec<Job>,
}

impl JobStore {
    pub fn new() -> Self {
        Self { jobs: RwLock::new(HashMap::new()) }
    }

    pub fn enqueue(&self, job: Job) -> JobId {
        let id = job.id;
        self.jobs.write().insert(id, job);
        id
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.read().get(&id).cloned()
    }

    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.read().values().cloned().collect();
        jobs.sort_by(|a, b| a.created.cmp(&b.created).then(a.id.cmp(&b.id)));
        jobs
    }

    pub fn list_by_state(&self, state: JobState) -> Vec<Job> {
        self.list().into_iter().filter(|j| std::mem::discriminant(&j.state) == std::mem::discriminant(&state)).collect()
    }

    /// Jobs currently holding a claim on `(target, kind)` — i.e. queued,
    /// starting, or running with that target and artifact kind.
    pub fn active_on(&self, target: &str, kind: ArtifactKind) -> Vec<Job> {
        self.jobs
            .read()
            .values()
            .filter(|j| !j.state.is_terminal() && j.artifact == kind && j.target.as_deref() == Some(target))
            .cloned()
            .collect()
    }

    /// Every `(target, kind)` currently claimed by a non-terminal job.
    /// Used by the batch planner's idempotence check.
    pub fn active_claims(&self) -> std::collections::HashSet<(String, ArtifactKind)> {
        self.jobs
            .read()
            .values()
            .filter(|j| !j.state.is_terminal())
            .filter_map(|j| j.claim_key())
            .collect()
    }

    /// Applies a state transition, validating it against the declared graph.
    /// Stamps `started`/`ended` timestamps and enforces
    /// `progress = 100 iff state = completed`.
    pub fn transition(&self, id: JobId, next: JobState) -> Result<Job> {
        let mut guard = self.jobs.write();
        let job = guard.get_mut(&id).ok_or_else(|| CoreError::not_found(format!("job {id} not found")))?;

        if job.state == next {
            // Cancel of an already-terminal job is an idempotent no-op.
            return Ok(job.clone());
        }
        if !job.state.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "illegal transition {} -> {} for job {id}",
                job.state, next
            )));
        }

        match next {
            JobState::Starting => job.started = Some(Utc::now()),
            JobState::Completed => {
                job.progress = Some(100);
                job.ended = Some(Utc::now());
            }
            JobState::Failed | JobState::Canceled => job.ended = Some(Utc::now()),
            _ => {}
        }
        job.state = next;
        Ok(job.clone())
    }

    pub fn set_progress(&self, id: JobId, processed: u64, total: u64) -> Result<()> {
        let mut guard = self.jobs.write();
        let job = guard.get_mut(&id).ok_or_else(|| CoreError::not_found(format!("job {id} not found")))?;
        job.processed = processed;
        job.total = total;
        if total > 0 {
            job.progress = Some(((processed.min(total) * 100) / total) as u8);
        }
        Ok(())
    }

    pub fn set_error(&self, id: JobId, message: impl Into<String>) -> Result<()> {
        let mut guard = self.jobs.write();
        let job = guard.get_mut(&id).ok_or_else(|| CoreError::not_found(format!("job {id} not found")))?;
        job.error = Some(message.into());
        Ok(())
    }

    pub fn set_result(&self, id: JobId, result: serde_json::Value) -> Result<()> {
        let mut guard = self.jobs.write();
        let job = guard.get_mut(&id).ok_or_else(|| CoreError::not_found(format!("job {id} not found")))?;
        job.result = Some(result);
        Ok(())
    }

    pub fn set_paused_flag(&self, id: JobId, paused: bool) {
        if let Some(job) = self.jobs.write().get_mut(&id) {
            job.paused = paused;
        }
    }

    /// Transitions every queued job straight to `canceled`; returns their
    /// ids. Running/starting jobs are untouched — cancellation of those is
    /// a scheduler-owned cooperative signal, not a store-level transition.
    pub fn cancel_queued_all(&self) -> Vec<JobId> {
        let ids: Vec<JobId> = self
            .jobs
            .read()
            .values()
            .filter(|j| j.state == JobState::Queued)
            .map(|j| j.id)
            .collect();
        for id in &ids {
            let _ = self.transition(*id, JobState::Canceled);
        }
        ids
    }

    /// Returns the ids of every starting/running job, for the Scheduler to
    /// signal via their cancellation tokens. Does not itself transition
    /// anything — the eventual `canceled` transition happens once the
    /// worker acknowledges or the grace window elapses.
    pub fn active_job_ids(&self) -> Vec<JobId> {
        self.jobs.read().values().filter(|j| j.state.is_active()).map(|j| j.id).collect()
    }

    /// Removes every terminal-state record; returns how many were dropped.
    pub fn clear_finished(&self) -> usize {
        let mut guard = self.jobs.write();
        let before = guard.len();
        guard.retain(|_, j| !j.state.is_terminal());
        before - guard.len()
    }

    pub fn stats(&self) -> JobStats {
        let jobs = self.jobs.read();
        let mut stats = JobStats::default();
        for j in jobs.values() {
            match j.state {
                JobState::Queued => stats.queued += 1,
                JobState::Starting => stats.starting += 1,
                JobState::Running => stats.running += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Canceled => stats.canceled += 1,
            }
        }
        stats
    }

    /// Serializes every job to the given path as a JSON snapshot. Called on
    /// clean shutdown.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let snapshot = Snapshot { saved_at: Utc::now(), jobs: self.list() };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&snapshot)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Loads a snapshot, restoring non-terminal jobs as `queued + paused`
    /// (never auto-run) and dropping terminal jobs older than
    /// `terminal_horizon`.
    pub fn load_from_file(path: &Path, terminal_horizon: ChronoDuration) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = std::fs::read(path)?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        let store = Self::new();
        let now = Utc::now();

        let mut jobs = snapshot.jobs;
        for job in &mut jobs {
            if !job.state.is_terminal() {
                job.state = JobState::Queued;
                job.paused = true;
            }
        }
        jobs.retain(|job| {
            if job.state.is_terminal() {
                job.ended.map(|ended| now - ended < terminal_horizon).unwrap_or(true)
            } else {
                true
            }
        });

        let mut guard = store.jobs.write();
        for job in jobs {
            guard.insert(job.id, job);
        }
        drop(guard);
        Ok(store)
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct JobStats {
    pub queued: u64,
    pub starting: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub canceled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactKind;
    use serde_json::json;

    fn sample_job() -> Job {
        Job::new(ArtifactKind::Thumbnail, Some("a.mp4".to_string()), json!({}))
    }

    #[test]
    fn legal_transitions_succeed_in_order() {
        let store = JobStore::new();
        let id = store.enqueue(sample_job());
        store.transition(id, JobState::Starting).unwrap();
        store.transition(id, JobState::Running).unwrap();
        let job = store.transition(id, JobState::Completed).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, Some(100));
    }

    #[test]
    fn illegal_transition_rejected() {
        let store = JobStore::new();
        let id = store.enqueue(sample_job());
        assert!(store.transition(id, JobState::Completed).is_err());
    }

    #[test]
    fn cancel_of_terminal_job_is_idempotent() {
        let store = JobStore::new();
        let id = store.enqueue(sample_job());
        store.transition(id, JobState::Starting).unwrap();
        store.transition(id, JobState::Running).unwrap();
        store.transition(id, JobState::Completed).unwrap();
        let job = store.transition(id, JobState::Completed).unwrap();
        assert_eq!(job.state, JobState::Completed);
    }

    #[test]
    fn cancel_queued_all_transitions_only_queued() {
        let store = JobStore::new();
        let queued = store.enqueue(sample_job());
        let running = store.enqueue(sample_job());
        store.transition(running, JobState::Starting).unwrap();
        store.transition(running, JobState::Running).unwrap();

        let canceled = store.cancel_queued_all();
        assert_eq!(canceled, vec![queued]);
        assert_eq!(store.get(running).unwrap().state, JobState::Running);
    }

    #[test]
    fn save_and_load_round_trip_pauses_nonterminal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        let store = JobStore::new();
        let id = store.enqueue(sample_job());
        store.transition(id, JobState::Starting).unwrap();
        store.save_to_file(&path).unwrap();

        let loaded = JobStore::load_from_file(&path, ChronoDuration::days(7)).unwrap();
        let job = loaded.get(id).unwrap();
        assert_eq!(job.state, JobState::Queued);
        assert!(job.paused);
    }
}
