//! Worker Registry (C4): the set of named artifact producers and the
//! uniform contract the Scheduler drives them through.

pub mod context;
pub mod producers;
pub mod subprocess;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::artifact::{ArtifactKind, ToolClass};
use crate::media::MediaFile;
use crate::paths::Resolver;

pub use context::{ProgressReporter, ProgressUpdate, WorkerContext};

/// Error returned by a worker on failure.
#[derive(Debug, Clone)]
pub struct WorkerError {
    pub code: &'static str,
    pub message: String,
}

impl WorkerError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

pub type WorkerOutcome = std::result::Result<Value, WorkerError>;

/// The uniform contract every artifact producer implements. The Scheduler
/// treats all kinds identically through this trait — adding a new artifact
/// is adding a tag to [`ArtifactKind`] and one implementation here, nothing
/// else changes.
#[async_trait]
pub trait ArtifactWorker: Send + Sync {
    fn kind(&self) -> ArtifactKind;

    fn tool_class(&self) -> ToolClass {
        self.kind().tool_class()
    }

    /// Validates and normalizes worker-specific params. Called once per
    /// kind per batch by the planner; rejecting here rejects the whole
    /// batch before any job is enqueued.
    fn validate(&self, params: &Value) -> Result<Value, WorkerError>;

    /// Every sidecar this kind would write for `file`, used by probes and
    /// by `mode=clear` cleanup. Default delegates to the Resolver, which is
    /// correct for every producer that doesn't invent extra sidecars.
    fn plan(&self, resolver: &Resolver, file: &MediaFile) -> Vec<PathBuf> {
        resolver.resolve(&file.rel_path, self.kind())
    }

    /// Does the required external tool appear to be available? Used at
    /// batch-submission time to fail fast with a precise `tool-missing`
    /// error instead of enqueuing jobs doomed to fail in `run`.
    fn tool_available(&self) -> bool {
        match self.tool_class().required_binary() {
            Some(bin) => which(bin),
            None => true,
        }
    }

    async fn run(
        &self,
        ctx: &WorkerContext,
        resolver: &Resolver,
        file: &MediaFile,
        params: &Value,
    ) -> WorkerOutcome;
}

fn which(bin: &str) -> bool {
    std::env::var_os("PATH")
        .map(|paths| {
            std::env::split_paths(&paths).any(|dir| {
                let candidate = dir.join(bin);
                candidate.is_file()
            })
        })
        .unwrap_or(false)
}

/// Registry of named artifact producers, keyed by kind.
#[derive(Clone)]
pub struct WorkerRegistry {
    workers: HashMap<ArtifactKind, Arc<dyn ArtifactWorker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self { workers: HashMap::new() }
    }

    /// Registry wired with the default producer for every declared kind.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(producers::metadata::MetadataWorker));
        reg.register(Arc::new(producers::thumbnail::ThumbnailWorker));
        reg.register(Arc::new(producers::preview::PreviewWorker));
        reg.register(Arc::new(producers::sprites::SpritesWorker));
        reg.register(Arc::new(producers::heatmaps::HeatmapsWorker));
        reg.register(Arc::new(producers::markers::MarkersWorker));
        reg.register(Arc::new(producers::subtitles::SubtitlesWorker));
        reg.register(Arc::new(producers::faces::FacesWorker));
        reg.register(Arc::new(producers::embeddings::EmbeddingsWorker));
        reg.register(Arc::new(producers::phash::PhashWorker));
        reg
    }

    pub fn register(&mut self, worker: Arc<dyn ArtifactWorker>) {
        self.workers.insert(worker.kind(), worker);
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<Arc<dyn ArtifactWorker>> {
        self.workers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ArtifactKind> {
        self.workers.keys()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_every_kind() {
        let reg = WorkerRegistry::with_defaults();
        for kind in ArtifactKind::ALL {
            assert!(reg.get(kind).is_some(), "missing worker for {kind:?}");
        }
    }
}
