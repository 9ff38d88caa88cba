//! Orphan & Repair Engine (C10).
//!
//! An "orphan" is a sidecar file whose inferred media stem no longer
//! resolves to an existing media file — the source was renamed or moved
//! out from under it. This module finds those, ranks plausible renamed
//! targets by stem similarity, and can apply a repair by renaming the
//! orphaned sidecar onto the matched target's sidecar path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use serde::Serialize;
use walkdir::WalkDir;

use crate::artifact::ArtifactKind;
use crate::error::{CoreError, Result};
use crate::media::{walk_media, MediaFile};
use crate::paths::Resolver;

#[derive(Debug, Clone, Serialize)]
pub struct OrphanSidecar {
    pub sidecar_path: PathBuf,
    pub kind: ArtifactKind,
    /// The media stem (root-relative, no extension) the sidecar's filename
    /// implies, per the Resolver's naming convention.
    pub orphan_stem: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairSuggestion {
    pub sidecar_path: PathBuf,
    pub kind: ArtifactKind,
    pub candidate: MediaFile,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairOutcome {
    Moved,
    Skipped,
    Failed,
}

pub struct OrphanEngine {
    resolver: Arc<Resolver>,
}

impl OrphanEngine {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }

    /// Walks every file under `subdir` (including `.artifacts` directories,
    /// unlike the media walk) and returns every sidecar whose inferred
    /// media stem has no corresponding media file on disk.
    pub fn scan(&self, subdir: &str) -> Result<Vec<OrphanSidecar>> {
        let root = self.resolver.root();
        let start = if subdir.is_empty() { root.to_path_buf() } else { root.join(subdir) };
        if !start.exists() {
            return Err(CoreError::not_found(format!("directory not found: {subdir}")));
        }

        let mut orphans = Vec::new();
        let walker = WalkDir::new(&start)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && e.file_name() == ".reelforge-tmp"));
        for entry in walker {
            let entry = entry.map_err(|e| CoreError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some((kind, stem)) = self.resolver.infer_from_sidecar(entry.path()) else {
                continue;
            };
            if !media_exists_for_stem(root, &stem) {
                orphans.push(OrphanSidecar {
                    sidecar_path: entry.path().to_path_buf(),
                    kind,
                    orphan_stem: stem,
                });
            }
        }
        Ok(orphans)
    }

    /// For every discovered orphan, ranks every media file under `subdir`
    /// by stem similarity and returns the best candidate at or above
    /// `confidence_floor`, if any.
    pub fn suggest(&self, subdir: &str, confidence_floor: f64) -> Result<Vec<RepairSuggestion>> {
        let orphans = self.scan(subdir)?;
        let candidates = walk_media(self.resolver.root(), subdir, true, None)?;
        let mut suggestions = Vec::new();

        for orphan in orphans {
            let orphan_stem_name = Path::new(&orphan.orphan_stem)
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or(&orphan.orphan_stem);

            let best = candidates
                .iter()
                .map(|candidate| (candidate, stem_confidence(orphan_stem_name, candidate.stem())))
                .filter(|(_, score)| *score >= confidence_floor)
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

            if let Some((candidate, confidence)) = best {
                suggestions.push(RepairSuggestion {
                    sidecar_path: orphan.sidecar_path,
                    kind: orphan.kind,
                    candidate: candidate.clone(),
                    confidence,
                });
            }
        }

        suggestions.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        Ok(suggestions)
    }

    /// Same computation as [`suggest`](Self::suggest), emitted one item at
    /// a time for the streaming preview endpoint rather than collected into
    /// a single response — useful when a library has thousands of orphans.
    pub fn suggest_stream<'a>(
        &'a self,
        subdir: &'a str,
        confidence_floor: f64,
    ) -> impl Stream<Item = Result<RepairSuggestion>> + 'a {
        stream! {
            let orphans = match self.scan(subdir) {
                Ok(o) => o,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let candidates = match walk_media(self.resolver.root(), subdir, true, None) {
                Ok(c) => c,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            for orphan in orphans {
                let orphan_stem_name = Path::new(&orphan.orphan_stem)
                    .file_name()
                    .and_then(|s| s.to_str())
                    .unwrap_or(&orphan.orphan_stem)
                    .to_string();

                let best = candidates
                    .iter()
                    .map(|candidate| (candidate, stem_confidence(&orphan_stem_name, candidate.stem())))
                    .filter(|(_, score)| *score >= confidence_floor)
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

                if let Some((candidate, confidence)) = best {
                    yield Ok(RepairSuggestion {
                        sidecar_path: orphan.sidecar_path,
                        kind: orphan.kind,
                        candidate: candidate.clone(),
                        confidence,
                    });
                }
            }
        }
    }

    /// Applies a repair: renames `sidecar_path` onto the sidecar location
    /// implied by `(candidate, kind)`. Refuses to clobber an existing
    /// non-empty sidecar unless `allow_overwrite` is set — repair must never
    /// silently destroy an existing artifact.
    pub fn repair(
        &self,
        sidecar_path: &Path,
        kind: ArtifactKind,
        candidate: &MediaFile,
        allow_overwrite: bool,
    ) -> Result<RepairOutcome> {
        if !sidecar_path.exists() {
            return Ok(RepairOutcome::Failed);
        }
        let ext = sidecar_path.extension().and_then(|e| e.to_str());
        let destinations = self.resolver.resolve(&candidate.rel_path, kind);
        let destination = destinations
            .iter()
            .find(|d| d.extension().and_then(|e| e.to_str()) == ext)
            .or_else(|| destinations.first())
            .ok_or_else(|| CoreError::internal(format!("no sidecar template for {kind}")))?;

        if destination.exists() {
            let nonzero = std::fs::metadata(destination).map(|m| m.len() > 0).unwrap_or(false);
            if nonzero && !allow_overwrite {
                return Ok(RepairOutcome::Skipped);
            }
        }

        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::rename(sidecar_path, destination) {
            Ok(()) => Ok(RepairOutcome::Moved),
            Err(_) => Ok(RepairOutcome::Failed),
        }
    }
}

fn media_exists_for_stem(root: &Path, stem: &str) -> bool {
    for ext in crate::media::VIDEO_EXTENSIONS {
        if root.join(format!("{stem}.{ext}")).exists() {
            return true;
        }
    }
    false
}

/// Stem similarity score per the ranking rule: exact match 1.00,
/// case-insensitive 0.95, punctuation/whitespace-normalized 0.85, otherwise
/// a longest-common-substring ratio — gated on a minimum match length of
/// `min(12, 0.6 * orphan_stem_len)` — capped at 0.80. Below that length
/// gate the pair scores 0.0 and is filtered out by the confidence floor.
fn stem_confidence(orphan_stem: &str, candidate_stem: &str) -> f64 {
    if orphan_stem == candidate_stem {
        return 1.00;
    }
    if orphan_stem.eq_ignore_ascii_case(candidate_stem) {
        return 0.95;
    }
    let na = normalize(orphan_stem);
    let nb = normalize(candidate_stem);
    if !na.is_empty() && na == nb {
        return 0.85;
    }
    let orphan_len = orphan_stem.chars().count().max(1);
    let min_len = (12usize).min(((orphan_len as f64) * 0.6).ceil() as usize).max(1);
    let lcs = longest_common_substring(&na, &nb);
    if lcs < min_len {
        return 0.0;
    }
    (lcs as f64 / orphan_len as f64 * 0.80).min(0.80)
}

fn normalize(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).flat_map(|c| c.to_lowercase()).collect()
}

/// Length of the longest contiguous run shared by `a` and `b`.
fn longest_common_substring(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut best = 0;
    for i in 1..=a.len() {
        let mut curr = vec![0usize; b.len() + 1];
        for j in 1..=b.len() {
            if a[i - 1] == b[j - 1] {
                curr[j] = prev[j - 1] + 1;
                best = best.max(curr[j]);
            }
        }
        prev = curr;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn scan_finds_sidecar_with_no_matching_media() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("renamed.thumbnail.jpg"), b"x").unwrap();
        let resolver = Arc::new(Resolver::new(dir.path()));
        let engine = OrphanEngine::new(resolver);

        let orphans = engine.scan("").unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].kind, ArtifactKind::Thumbnail);
    }

    #[test]
    fn scan_skips_sidecar_with_matching_media() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("a.thumbnail.jpg"), b"x").unwrap();
        let resolver = Arc::new(Resolver::new(dir.path()));
        let engine = OrphanEngine::new(resolver);

        assert!(engine.scan("").unwrap().is_empty());
    }

    #[test]
    fn suggest_ranks_case_insensitive_match_above_floor() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ALIEN.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("alien.thumbnail.jpg"), b"x").unwrap();
        let resolver = Arc::new(Resolver::new(dir.path()));
        let engine = OrphanEngine::new(resolver);

        let suggestions = engine.suggest("", 0.60).unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].confidence, 0.95);
        assert_eq!(suggestions[0].candidate.rel_path, "ALIEN.mp4");
    }

    #[test]
    fn repair_refuses_to_overwrite_nonempty_destination() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("b.thumbnail.jpg"), b"existing").unwrap();
        std::fs::write(dir.path().join("orphan.thumbnail.jpg"), b"orphaned").unwrap();
        let resolver = Arc::new(Resolver::new(dir.path()));
        let engine = OrphanEngine::new(resolver);

        let outcome = engine
            .repair(&dir.path().join("orphan.thumbnail.jpg"), ArtifactKind::Thumbnail, &MediaFile::new("b.mp4"), false)
            .unwrap();
        assert_eq!(outcome, RepairOutcome::Skipped);
    }

    #[test]
    fn repair_moves_sidecar_onto_destination() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("orphan.thumbnail.jpg"), b"orphaned").unwrap();
        let resolver = Arc::new(Resolver::new(dir.path()));
        let engine = OrphanEngine::new(resolver);

        let outcome = engine
            .repair(&dir.path().join("orphan.thumbnail.jpg"), ArtifactKind::Thumbnail, &MediaFile::new("b.mp4"), false)
            .unwrap();
        assert_eq!(outcome, RepairOutcome::Moved);
        assert!(dir.path().join("b.thumbnail.jpg").exists());
    }

    #[tokio::test]
    async fn suggest_stream_yields_same_results_as_suggest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ALIEN.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("alien.thumbnail.jpg"), b"x").unwrap();
        let resolver = Arc::new(Resolver::new(dir.path()));
        let engine = OrphanEngine::new(resolver);

        let streamed: Vec<_> = engine.suggest_stream("", 0.60).collect().await;
        assert_eq!(streamed.len(), 1);
        assert!(streamed[0].is_ok());
    }
}
