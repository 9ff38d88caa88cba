//! Coverage Aggregator (C9): per-directory `{kind: {processed, missing,
//! total}}` rollups, cached and single-flighted so a storm of dashboard
//! refreshes against the same directory doesn't each re-walk and re-probe
//! the whole tree.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::artifact::ArtifactKind;
use crate::error::Result;
use crate::media::walk_media;
use crate::paths::Resolver;
use crate::status_cache::StatusCache;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct KindCoverage {
    pub processed: u64,
    pub missing: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub path: String,
    pub recursive: bool,
    pub kinds: HashMap<ArtifactKind, KindCoverage>,
}

struct CacheEntry {
    report: CoverageReport,
    computed_at: Instant,
}

/// Per-directory single-flight lock: the second concurrent caller for the
/// same key awaits the first's computation instead of re-walking.
pub struct CoverageAggregator {
    resolver: Arc<Resolver>,
    status_cache: Arc<StatusCache>,
    ttl: Duration,
    cache: DashMap<String, CacheEntry>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl CoverageAggregator {
    pub fn new(resolver: Arc<Resolver>, status_cache: Arc<StatusCache>, ttl: Duration) -> Self {
        Self {
            resolver,
            status_cache,
            ttl,
            cache: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    fn cache_key(path: &str, recursive: bool) -> String {
        format!("{path}|{recursive}")
    }

    pub async fn coverage(&self, path: &str, recursive: bool) -> Result<CoverageReport> {
        let key = Self::cache_key(path, recursive);

        if let Some(entry) = self.cache.get(&key) {
            if entry.computed_at.elapsed() < self.ttl {
                return Ok(entry.report.clone());
            }
        }

        let lock = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another caller may have finished the computation while we were
        // waiting for the lock; re-check before doing the walk ourselves.
        if let Some(entry) = self.cache.get(&key) {
            if entry.computed_at.elapsed() < self.ttl {
                return Ok(entry.report.clone());
            }
        }

        let report = self.compute(path, recursive)?;
        self.cache.insert(key.clone(), CacheEntry { report: report.clone(), computed_at: Instant::now() });
        self.inflight.remove(&key);
        Ok(report)
    }

    fn compute(&self, path: &str, recursive: bool) -> Result<CoverageReport> {
        let dir = self.resolver.canonicalize(path)?;
        let files = walk_media(self.resolver.root(), &dir, recursive, None)?;

        let mut kinds: HashMap<ArtifactKind, KindCoverage> = HashMap::new();
        for kind in ArtifactKind::ALL {
            let mut cov = KindCoverage { total: files.len() as u64, ..Default::default() };
            for file in &files {
                let state = self.status_cache.get(&self.resolver, file, kind);
                if state.is_present() {
                    cov.processed += 1;
                } else {
                    cov.missing += 1;
                }
            }
            kinds.insert(kind, cov);
        }

        Ok(CoverageReport { path: dir, recursive, kinds })
    }

    /// Invalidates every cached report whose directory is an ancestor of
    /// `changed_dir` (a finished job or a filesystem change under a
    /// subdirectory invalidates coverage computed for any parent).
    pub fn invalidate(&self, changed_dir: &str) {
        self.cache.retain(|key, _| {
            let report_dir = key.split('|').next().unwrap_or("");
            !(report_dir.is_empty() || changed_dir.starts_with(report_dir))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn computes_processed_and_missing_counts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("a.thumbnail.jpg"), b"thumb").unwrap();
        std::fs::write(dir.path().join("b.mp4"), b"x").unwrap();

        let resolver = Arc::new(Resolver::new(dir.path()));
        let status_cache = Arc::new(StatusCache::new(Duration::from_secs(30), Duration::from_secs(2)));
        let aggregator = CoverageAggregator::new(resolver, status_cache, Duration::from_secs(30));

        let report = aggregator.coverage("", true).await.unwrap();
        let thumb = report.kinds.get(&ArtifactKind::Thumbnail).unwrap();
        assert_eq!(thumb.total, 2);
        assert_eq!(thumb.processed, 1);
        assert_eq!(thumb.missing, 1);
    }

    #[tokio::test]
    async fn second_call_within_ttl_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        let resolver = Arc::new(Resolver::new(dir.path()));
        let status_cache = Arc::new(StatusCache::new(Duration::from_secs(30), Duration::from_secs(2)));
        let aggregator = CoverageAggregator::new(resolver, status_cache, Duration::from_secs(30));

        aggregator.coverage("", true).await.unwrap();
        std::fs::write(dir.path().join("b.mp4"), b"x").unwrap();
        let report = aggregator.coverage("", true).await.unwrap();
        let thumb = report.kinds.get(&ArtifactKind::Thumbnail).unwrap();
        assert_eq!(thumb.total, 1, "cached report should not see the newly added file yet");
    }
}
