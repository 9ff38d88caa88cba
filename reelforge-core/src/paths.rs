//! Path & Sidecar Resolver (C1).
//!
//! The resolver is the single source of truth for where an artifact's
//! sidecar file(s) live on disk. All other components — the Probe, the
//! Worker Registry, the Orphan engine — go through here rather than
//! constructing paths themselves.

use std::path::{Path, PathBuf};

use crate::artifact::ArtifactKind;
use crate::error::{CoreError, Result};

/// Where a sidecar lives relative to its media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarLocation {
    /// Next to the media file, e.g. `<stem>.thumbnail.jpg`.
    Colocated,
    /// Under the media file's `.artifacts/` sibling directory.
    ArtifactsDir,
}

/// One sidecar template: the `<kind-token>.<ext>` suffix appended to the
/// media stem, and where it lives.
#[derive(Debug, Clone, Copy)]
struct Template {
    location: SidecarLocation,
    /// The token embedded in the filename, e.g. "thumbnail" or "sprites".
    token: &'static str,
    ext: &'static str,
}

fn templates_for(kind: ArtifactKind) -> &'static [Template] {
    use SidecarLocation::*;
    match kind {
        ArtifactKind::Metadata => &[Template { location: ArtifactsDir, token: "metadata", ext: "json" }],
        ArtifactKind::Thumbnail => &[Template { location: Colocated, token: "thumbnail", ext: "jpg" }],
        ArtifactKind::Preview => &[
            Template { location: Colocated, token: "preview", ext: "webm" },
            Template { location: Colocated, token: "preview", ext: "mp4" },
        ],
        ArtifactKind::Sprites => &[
            Template { location: ArtifactsDir, token: "sprites", ext: "jpg" },
            Template { location: ArtifactsDir, token: "sprites", ext: "json" },
        ],
        ArtifactKind::Heatmaps => &[
            Template { location: ArtifactsDir, token: "heatmaps", ext: "json" },
            Template { location: ArtifactsDir, token: "heatmaps", ext: "png" },
        ],
        ArtifactKind::Markers => &[Template { location: ArtifactsDir, token: "markers", ext: "json" }],
        ArtifactKind::Subtitles => &[Template { location: Colocated, token: "subtitles", ext: "srt" }],
        ArtifactKind::Faces => &[Template { location: ArtifactsDir, token: "faces", ext: "json" }],
        ArtifactKind::Embeddings => &[Template { location: ArtifactsDir, token: "embeddings", ext: "json" }],
        ArtifactKind::Phash => &[Template { location: ArtifactsDir, token: "phash", ext: "json" }],
    }
}

#[derive(Debug, Clone)]
pub struct Resolver {
    root: PathBuf,
}

impl Resolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic, pure: maps (media path, kind) to every declared
    /// sidecar path, primary first.
    pub fn resolve(&self, media_rel_path: &str, kind: ArtifactKind) -> Vec<PathBuf> {
        let media_path = Path::new(media_rel_path);
        let stem = media_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(media_rel_path);
        let dir = media_path.parent().unwrap_or_else(|| Path::new(""));

        templates_for(kind)
            .iter()
            .map(|t| {
                let filename = format!("{stem}.{}.{}", t.token, t.ext);
                match t.location {
                    SidecarLocation::Colocated => self.root.join(dir).join(filename),
                    SidecarLocation::ArtifactsDir => self.root.join(dir).join(".artifacts").join(filename),
                }
            })
            .collect()
    }

    /// Rejects `..` escapes outside root; normalizes separators. Accepts a
    /// user-supplied subdirectory/path string and returns the root-relative
    /// POSIX form.
    pub fn canonicalize(&self, user_input: &str) -> Result<String> {
        let trimmed = user_input.trim().trim_start_matches('/').trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(String::new());
        }
        let mut normalized_parts = Vec::new();
        for part in trimmed.split(['/', '\\']) {
            match part {
                "" | "." => continue,
                ".." => {
                    return Err(CoreError::invalid_input(format!(
                        "path escapes root: {user_input}"
                    )));
                }
                other => normalized_parts.push(other),
            }
        }
        Ok(normalized_parts.join("/"))
    }

    /// Inverse of `resolve`: given a sidecar path (absolute or root-relative),
    /// determine which kind and media stem it belongs to. Returns `None` if
    /// the filename does not match any declared template.
    pub fn infer_from_sidecar(&self, sidecar_path: &Path) -> Option<(ArtifactKind, String)> {
        let rel = sidecar_path.strip_prefix(&self.root).unwrap_or(sidecar_path);
        let filename = rel.file_name()?.to_str()?;
        let parent = rel.parent().unwrap_or_else(|| Path::new(""));

        let (dir, location) = if parent.file_name().map(|n| n == ".artifacts").unwrap_or(false) {
            (parent.parent().unwrap_or_else(|| Path::new("")), SidecarLocation::ArtifactsDir)
        } else {
            (parent, SidecarLocation::Colocated)
        };

        for kind in ArtifactKind::ALL {
            for t in templates_for(kind) {
                if t.location != location {
                    continue;
                }
                let suffix = format!(".{}.{}", t.token, t.ext);
                if let Some(stem) = filename.strip_suffix(&suffix) {
                    if stem.is_empty() {
                        continue;
                    }
                    let media_rel = if dir.as_os_str().is_empty() {
                        stem.to_string()
                    } else {
                        format!("{}/{}", dir.to_string_lossy(), stem)
                    };
                    return Some((kind, media_rel));
                }
            }
        }
        None
    }
}
