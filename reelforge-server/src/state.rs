//! Process-wide application state wired once at startup and shared by
//! every handler through axum's `State` extractor.

use std::sync::Arc;

use reelforge_core::coverage::CoverageAggregator;
use reelforge_core::events::{spawn_cache_invalidator, EventBus};
use reelforge_core::jobs::JobStore;
use reelforge_core::orphan::OrphanEngine;
use reelforge_core::paths::Resolver;
use reelforge_core::planner::Planner;
use reelforge_core::scheduler::Scheduler;
use reelforge_core::status_cache::StatusCache;
use reelforge_core::worker::WorkerRegistry;
use tracing::{info, warn};

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub resolver: Arc<Resolver>,
    pub registry: Arc<WorkerRegistry>,
    pub store: Arc<JobStore>,
    pub status_cache: Arc<StatusCache>,
    pub events: EventBus,
    pub scheduler: Arc<Scheduler>,
    pub planner: Arc<Planner>,
    pub coverage: Arc<CoverageAggregator>,
    pub orphans: Arc<OrphanEngine>,
}

impl AppState {
    /// Builds every component in dependency order and restores the job
    /// store snapshot from a clean shutdown, if any. Restored non-terminal
    /// jobs come back `queued + paused`; they are never auto-run.
    pub fn bootstrap(config: ServerConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let resolver = Arc::new(Resolver::new(&config.media_root));
        let registry = Arc::new(WorkerRegistry::with_defaults());
        let status_cache = Arc::new(StatusCache::new(
            config.runtime.status_cache_ttl,
            config.runtime.staleness_tolerance,
        ));
        let events = EventBus::new(config.runtime.event_bus_queue_depth);

        let store_path = config.job_store_path();
        let store = match JobStore::load_from_file(&store_path, config.job_store_horizon) {
            Ok(store) => {
                info!(path = %store_path.display(), "restored job store snapshot");
                Arc::new(store)
            }
            Err(err) => {
                warn!(path = %store_path.display(), error = %err, "failed to load job store snapshot, starting empty");
                Arc::new(JobStore::new())
            }
        };

        let scheduler = Scheduler::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&resolver),
            events.clone(),
            config.runtime.clone(),
        );

        let planner = Arc::new(Planner::new(
            Arc::clone(&resolver),
            Arc::clone(&registry),
            Arc::clone(&status_cache),
            Arc::clone(&store),
            events.clone(),
            Arc::clone(&scheduler),
        ));

        let coverage = Arc::new(CoverageAggregator::new(
            Arc::clone(&resolver),
            Arc::clone(&status_cache),
            config.runtime.status_cache_ttl,
        ));

        let orphans = Arc::new(OrphanEngine::new(Arc::clone(&resolver)));

        spawn_cache_invalidator(events.clone(), Arc::clone(&status_cache), Arc::clone(&coverage));

        Ok(Self {
            config,
            resolver,
            registry,
            store,
            status_cache,
            events,
            scheduler,
            planner,
            coverage,
            orphans,
        })
    }

    /// Persists the job store snapshot to the configured state directory.
    /// All non-terminal jobs are persisted on clean shutdown.
    pub fn persist_job_store(&self) -> anyhow::Result<()> {
        self.store.save_to_file(&self.config.job_store_path())?;
        Ok(())
    }
}
