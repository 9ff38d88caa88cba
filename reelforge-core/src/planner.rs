//! Batch Planner (C7): expands a single batch request into individual jobs.
//!
//! A batch names a directory, a set of kinds (or the fast-first composite
//! "all missing"), a scope (every file under the directory, or a specific
//! selection), and a mode (only what's missing, force everything, or clear
//! sidecars outright). The planner is where all of that gets flattened into
//! concrete `(file, kind)` pairs and turned into job records — nothing
//! downstream needs to know a batch ever existed.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::artifact::ArtifactKind;
use crate::error::{CoreError, Result};
use crate::events::{EventBus, JobEvent, JobEventBody};
use crate::jobs::{Job, JobStore};
use crate::media::{walk_media, MediaFile};
use crate::paths::Resolver;
use crate::scheduler::Scheduler;
use crate::status_cache::StatusCache;
use crate::worker::WorkerRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Only `(file, kind)` pairs that are not currently present.
    Missing,
    /// Every `(file, kind)` pair, regardless of current state.
    All,
    /// Delete existing sidecars instead of generating anything.
    Clear,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BatchKinds {
    /// An explicit kind list.
    Specific { kinds: Vec<ArtifactKind> },
    /// The fast-first composite: every declared kind, cheapest first.
    AllMissing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum BatchScope {
    /// Every media file discovered under `path`.
    All,
    /// Only the given root-relative file paths (still constrained to be
    /// under `path`).
    Selected { paths: Vec<String> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_true")]
    pub recursive: bool,
    pub kinds: BatchKinds,
    pub mode: BatchMode,
    #[serde(default = "default_scope")]
    pub scope: BatchScope,
    #[serde(default)]
    pub params: HashMap<ArtifactKind, Value>,
}

fn default_true() -> bool {
    true
}

fn default_scope() -> BatchScope {
    BatchScope::All
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub enqueued: Vec<crate::jobs::JobId>,
    pub skipped_existing_claim: usize,
    pub cleared: usize,
    pub files_considered: usize,
}

pub struct Planner {
    resolver: Arc<Resolver>,
    registry: Arc<WorkerRegistry>,
    status_cache: Arc<StatusCache>,
    store: Arc<JobStore>,
    events: EventBus,
    scheduler: Arc<Scheduler>,
}

impl Planner {
    pub fn new(
        resolver: Arc<Resolver>,
        registry: Arc<WorkerRegistry>,
        status_cache: Arc<StatusCache>,
        store: Arc<JobStore>,
        events: EventBus,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self { resolver, registry, status_cache, store, events, scheduler }
    }

    fn expand_kinds(&self, kinds: &BatchKinds) -> Vec<ArtifactKind> {
        match kinds {
            BatchKinds::AllMissing => ArtifactKind::FAST_FIRST_ORDER.to_vec(),
            BatchKinds::Specific { kinds } => kinds.clone(),
        }
    }

    /// Validates every named kind's params exactly once: a single bad kind
    /// rejects the whole batch before anything is enqueued or deleted.
    fn validate_params(&self, kinds: &[ArtifactKind], params: &HashMap<ArtifactKind, Value>) -> Result<HashMap<ArtifactKind, Value>> {
        let mut validated = HashMap::new();
        for kind in kinds {
            let worker = self
                .registry
                .get(*kind)
                .ok_or_else(|| CoreError::internal(format!("no worker registered for {kind}")))?;
            if !worker.tool_available() {
                return Err(CoreError::ToolMissing(format!(
                    "required tool for {kind} is not available on PATH"
                )));
            }
            let raw = params.get(kind).cloned().unwrap_or(Value::Null);
            let normalized = worker
                .validate(&raw)
                .map_err(|e| CoreError::invalid_input(format!("{kind}: {}", e.message)))?;
            validated.insert(*kind, normalized);
        }
        Ok(validated)
    }

    pub fn submit(&self, req: BatchRequest) -> Result<BatchResult> {
        let dir = self.resolver.canonicalize(&req.path)?;
        let files = walk_media(self.resolver.root(), &dir, req.recursive, None)?;

        let files = match &req.scope {
            BatchScope::All => files,
            BatchScope::Selected { paths } => {
                let selected: HashSet<&str> = paths.iter().map(|p| p.as_str()).collect();
                files.into_iter().filter(|f| selected.contains(f.rel_path.as_str())).collect()
            }
        };

        let kinds = self.expand_kinds(&req.kinds);
        let validated_params = self.validate_params(&kinds, &req.params)?;

        if req.mode == BatchMode::Clear {
            let cleared = self.clear(&files, &kinds);
            return Ok(BatchResult {
                enqueued: Vec::new(),
                skipped_existing_claim: 0,
                cleared,
                files_considered: files.len(),
            });
        }

        let mut enqueued = Vec::new();
        let mut skipped = 0usize;
        let active_claims = self.store.active_claims();

        for file in &files {
            for kind in &kinds {
                if req.mode == BatchMode::Missing {
                    let state = self.status_cache.get(&self.resolver, file, *kind);
                    if state.is_present() {
                        continue;
                    }
                }
                if active_claims.contains(&(file.rel_path.clone(), *kind)) {
                    skipped += 1;
                    continue;
                }
                let params = validated_params.get(kind).cloned().unwrap_or(Value::Null);
                let job = Job::new(*kind, Some(file.rel_path.clone()), params);
                let id = self.store.enqueue(job.clone());
                self.events.publish(JobEvent::Created(JobEventBody {
                    job_id: id,
                    task: job.task.clone(),
                    artifact: *kind,
                    file: Some(file.rel_path.clone()),
                    state: job.state,
                    progress: None,
                    error: None,
                    ts: Utc::now(),
                }));
                enqueued.push(id);
            }
        }

        if !enqueued.is_empty() {
            self.scheduler.wake();
        }

        Ok(BatchResult {
            enqueued,
            skipped_existing_claim: skipped,
            cleared: 0,
            files_considered: files.len(),
        })
    }

    fn clear(&self, files: &[MediaFile], kinds: &[ArtifactKind]) -> usize {
        let mut cleared = 0;
        for file in files {
            for kind in kinds {
                let worker = match self.registry.get(*kind) {
                    Some(w) => w,
                    None => continue,
                };
                for sidecar in worker.plan(&self.resolver, file) {
                    if sidecar.exists() && std::fs::remove_file(&sidecar).is_ok() {
                        cleared += 1;
                    }
                }
                self.status_cache.invalidate_kind(&file.rel_path, *kind);
            }
        }
        cleared
    }
}
