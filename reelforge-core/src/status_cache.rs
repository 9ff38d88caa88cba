//! Artifact Status Cache (C3).
//!
//! A process-wide map keyed by media path holding a small record of
//! kind -> (state, last-checked). Entries expire after a configurable TTL
//! or are invalidated explicitly by the Event Bus. The cache never issues
//! writes to disk; it is purely a front for [`ArtifactProbe`], which it
//! constructs with the configured staleness tolerance.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::artifact::{ArtifactKind, ArtifactState};
use crate::media::MediaFile;
use crate::paths::Resolver;
use crate::probe::ArtifactProbe;

#[derive(Debug, Clone, Copy)]
struct CachedState {
    state: ArtifactState,
    checked_at: Instant,
}

#[derive(Debug, Default)]
struct FileEntry {
    kinds: HashMap<ArtifactKind, CachedState>,
}

pub struct StatusCache {
    ttl: Duration,
    entries: DashMap<String, FileEntry>,
    probe: ArtifactProbe,
}

impl StatusCache {
    pub fn new(ttl: Duration, staleness_tolerance: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
            probe: ArtifactProbe::new(staleness_tolerance),
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(2))
    }

    /// Returns the cached state for `(file, kind)` if fresh, otherwise
    /// re-probes, stores, and returns the fresh result.
    pub fn get(&self, resolver: &Resolver, file: &MediaFile, kind: ArtifactKind) -> ArtifactState {
        if let Some(entry) = self.entries.get(&file.rel_path) {
            if let Some(cached) = entry.kinds.get(&kind) {
                if cached.checked_at.elapsed() < self.ttl {
                    return cached.state;
                }
            }
        }

        let record = self.probe.check(resolver, file, kind);
        let mut entry = self.entries.entry(file.rel_path.clone()).or_default();
        entry.kinds.insert(
            kind,
            CachedState {
                state: record.state,
                checked_at: Instant::now(),
            },
        );
        record.state
    }

    /// `job.finished(kind, file)`: mark the entry stale so the next read
    /// re-probes instead of serving the cached (now outdated) value.
    pub fn invalidate_kind(&self, rel_path: &str, kind: ArtifactKind) {
        if let Some(mut entry) = self.entries.get_mut(rel_path) {
            entry.kinds.remove(&kind);
        }
    }

    /// `file.removed(file)`: drop the entire entry.
    pub fn invalidate_file(&self, rel_path: &str) {
        self.entries.remove(rel_path);
    }

    /// Drops every entry rooted under `dir` (used when a directory is
    /// removed or renamed wholesale).
    pub fn invalidate_dir(&self, dir: &str) {
        let prefix = if dir.is_empty() { String::new() } else { format!("{dir}/") };
        self.entries.retain(|path, _| !(dir.is_empty() || path.starts_with(&prefix)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_until_ttl_expires() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"src").unwrap();
        let resolver = Resolver::new(dir.path());
        let cache = StatusCache::new(Duration::from_millis(20), Duration::from_secs(2));
        let file = MediaFile::new("a.mp4");

        assert_eq!(cache.get(&resolver, &file, ArtifactKind::Thumbnail), ArtifactState::Absent);
        std::fs::write(dir.path().join("a.thumbnail.jpg"), b"thumb").unwrap();
        // Still within TTL: stale cached Absent value is served.
        assert_eq!(cache.get(&resolver, &file, ArtifactKind::Thumbnail), ArtifactState::Absent);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get(&resolver, &file, ArtifactKind::Thumbnail), ArtifactState::Present);
    }

    #[test]
    fn invalidate_kind_forces_reprobe_immediately() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"src").unwrap();
        let resolver = Resolver::new(dir.path());
        let cache = StatusCache::new(Duration::from_secs(30), Duration::from_secs(2));
        let file = MediaFile::new("a.mp4");

        assert_eq!(cache.get(&resolver, &file, ArtifactKind::Thumbnail), ArtifactState::Absent);
        std::fs::write(dir.path().join("a.thumbnail.jpg"), b"thumb").unwrap();
        cache.invalidate_kind(&file.rel_path, ArtifactKind::Thumbnail);
        assert_eq!(cache.get(&resolver, &file, ArtifactKind::Thumbnail), ArtifactState::Present);
    }

    #[test]
    fn invalidate_file_drops_whole_entry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"src").unwrap();
        let resolver = Resolver::new(dir.path());
        let cache = StatusCache::with_default_ttl();
        let file = MediaFile::new("a.mp4");
        cache.get(&resolver, &file, ArtifactKind::Thumbnail);
        assert_eq!(cache.len(), 1);
        cache.invalidate_file(&file.rel_path);
        assert_eq!(cache.len(), 0);
    }
}
