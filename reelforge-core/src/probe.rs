//! Artifact Probe (C2): a cheap, side-effect-free presence/staleness check
//! for a single (file, kind) pair.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use crate::artifact::{ArtifactKind, ArtifactState};
use crate::media::MediaFile;
use crate::paths::Resolver;

/// Outcome of probing one (file, kind) pair.
#[derive(Debug, Clone)]
pub struct ProbeRecord {
    pub state: ArtifactState,
    pub primary_sidecar: PathBuf,
    pub size: Option<u64>,
    pub mtime: Option<SystemTime>,
    pub error: Option<String>,
}

/// Stateless, concurrency-safe presence check. Probes never write to disk
/// and never panic on a missing file — "not found" is the expected common
/// case, not an error.
#[derive(Debug, Clone)]
pub struct ArtifactProbe {
    tolerance: Duration,
}

impl Default for ArtifactProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl ArtifactProbe {
    pub fn new(tolerance: Duration) -> Self {
        Self { tolerance }
    }

    /// Inspect the primary sidecar for `(file, kind)` and classify it.
    ///
    /// Staleness rule: sidecar mtime >= source mtime - tolerance. A
    /// zero-byte sidecar is always `Absent`, never `Present`. Filesystem
    /// errors other than "not found" surface as `Failed` with the error
    /// message captured rather than propagated, so a single unreadable
    /// sidecar can't abort a batch probe sweep.
    pub fn check(&self, resolver: &Resolver, file: &MediaFile, kind: ArtifactKind) -> ProbeRecord {
        let sidecars = resolver.resolve(&file.rel_path, kind);
        let primary = sidecars[0].clone();

        let sidecar_meta = match std::fs::metadata(&primary) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return ProbeRecord {
                    state: ArtifactState::Absent,
                    primary_sidecar: primary,
                    size: None,
                    mtime: None,
                    error: None,
                };
            }
            Err(e) => {
                return ProbeRecord {
                    state: ArtifactState::Failed,
                    primary_sidecar: primary,
                    size: None,
                    mtime: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let size = sidecar_meta.len();
        if size == 0 {
            return ProbeRecord {
                state: ArtifactState::Absent,
                primary_sidecar: primary,
                size: Some(0),
                mtime: sidecar_meta.modified().ok(),
                error: None,
            };
        }

        let sidecar_mtime = match sidecar_meta.modified() {
            Ok(m) => m,
            Err(e) => {
                return ProbeRecord {
                    state: ArtifactState::Failed,
                    primary_sidecar: primary,
                    size: Some(size),
                    mtime: None,
                    error: Some(e.to_string()),
                };
            }
        };

        let source_mtime = match file.mtime(resolver.root()) {
            Ok(m) => m,
            Err(e) => {
                return ProbeRecord {
                    state: ArtifactState::Failed,
                    primary_sidecar: primary,
                    size: Some(size),
                    mtime: Some(sidecar_mtime),
                    error: Some(e.to_string()),
                };
            }
        };

        let state = if sidecar_mtime + self.tolerance >= source_mtime {
            ArtifactState::Present
        } else {
            ArtifactState::Stale
        };

        ProbeRecord {
            state,
            primary_sidecar: primary,
            size: Some(size),
            mtime: Some(sidecar_mtime),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn setup() -> (tempfile::TempDir, Resolver) {
        let dir = tempfile::tempdir().unwrap();
        let resolver = Resolver::new(dir.path());
        (dir, resolver)
    }

    #[test]
    fn absent_when_sidecar_missing() {
        let (dir, resolver) = setup();
        std::fs::write(dir.path().join("a.mp4"), b"source").unwrap();
        let file = MediaFile::new("a.mp4");
        let rec = ArtifactProbe::default().check(&resolver, &file, ArtifactKind::Thumbnail);
        assert_eq!(rec.state, ArtifactState::Absent);
    }

    #[test]
    fn zero_byte_sidecar_is_absent() {
        let (dir, resolver) = setup();
        std::fs::write(dir.path().join("a.mp4"), b"source").unwrap();
        std::fs::write(dir.path().join("a.thumbnail.jpg"), b"").unwrap();
        let file = MediaFile::new("a.mp4");
        let rec = ArtifactProbe::default().check(&resolver, &file, ArtifactKind::Thumbnail);
        assert_eq!(rec.state, ArtifactState::Absent);
    }

    #[test]
    fn present_when_newer_than_source() {
        let (dir, resolver) = setup();
        std::fs::write(dir.path().join("a.mp4"), b"source").unwrap();
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(dir.path().join("a.thumbnail.jpg"), b"thumb").unwrap();
        let file = MediaFile::new("a.mp4");
        let rec = ArtifactProbe::default().check(&resolver, &file, ArtifactKind::Thumbnail);
        assert_eq!(rec.state, ArtifactState::Present);
    }

    #[test]
    fn stale_when_older_than_source_beyond_tolerance() {
        let (dir, resolver) = setup();
        std::fs::write(dir.path().join("a.thumbnail.jpg"), b"thumb").unwrap();
        std::thread::sleep(Duration::from_millis(50));
        let sidecar = dir.path().join("a.thumbnail.jpg");
        // Force the sidecar's mtime far enough behind the (about-to-be-written)
        // source file that it exceeds the 2s tolerance.
        let old = SystemTime::now() - Duration::from_secs(10);
        filetime_set(&sidecar, old);
        std::fs::write(dir.path().join("a.mp4"), b"source").unwrap();

        let file = MediaFile::new("a.mp4");
        let rec = ArtifactProbe::default().check(&resolver, &file, ArtifactKind::Thumbnail);
        assert_eq!(rec.state, ArtifactState::Stale);
    }

    fn filetime_set(path: &std::path::Path, time: SystemTime) {
        let file = std::fs::File::open(path).unwrap();
        file.set_modified(time).unwrap();
    }
}
