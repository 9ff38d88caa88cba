//! MediaFile identity and directory walking.
//!
//! A [`MediaFile`] carries no derived content — its identity is a canonical
//! relative path, and its attributes (size, mtime, extension) are observed
//! lazily from the filesystem. This module owns the directory walk used by
//! the Batch Planner and the Coverage Aggregator to enumerate the in-scope
//! set.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::error::{CoreError, Result};

/// Extensions considered video containers.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "webm", "flv", "wmv", "m4v", "mpg", "mpeg", "3gp", "ogv", "ts",
    "mts", "m2ts",
];

/// A discovered media file, identified by its canonical root-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MediaFile {
    /// POSIX-separated path relative to the configured root, no leading or
    /// trailing slash.
    pub rel_path: String,
}

impl MediaFile {
    pub fn new(rel_path: impl Into<String>) -> Self {
        Self {
            rel_path: rel_path.into(),
        }
    }

    pub fn stem(&self) -> &str {
        Path::new(&self.rel_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.rel_path)
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.rel_path).extension().and_then(|e| e.to_str())
    }

    pub fn dir(&self) -> &str {
        Path::new(&self.rel_path)
            .parent()
            .and_then(|p| p.to_str())
            .unwrap_or("")
    }

    pub fn absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.rel_path)
    }

    pub fn mtime(&self, root: &Path) -> Result<SystemTime> {
        Ok(std::fs::metadata(self.absolute(root))?.modified()?)
    }

    pub fn size(&self, root: &Path) -> Result<u64> {
        Ok(std::fs::metadata(self.absolute(root))?.len())
    }
}

fn is_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| VIDEO_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn to_rel_posix(root: &Path, entry: &Path) -> Result<String> {
    let rel = entry
        .strip_prefix(root)
        .map_err(|_| CoreError::internal("walked entry escaped root"))?;
    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Walk `root/subdir` (or `root` if `subdir` is empty) and return every
/// video MediaFile found. `.artifacts` sidecar directories are always
/// skipped — they never contain media.
pub fn walk_media(root: &Path, subdir: &str, recursive: bool, max_depth: Option<usize>) -> Result<Vec<MediaFile>> {
    let start = if subdir.is_empty() {
        root.to_path_buf()
    } else {
        root.join(subdir)
    };
    if !start.exists() {
        return Err(CoreError::not_found(format!("directory not found: {subdir}")));
    }

    let depth_limit = if recursive {
        max_depth.unwrap_or(usize::MAX)
    } else {
        1
    };

    let mut out = Vec::new();
    let walker = WalkDir::new(&start)
        .max_depth(depth_limit)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            if e.file_type().is_dir() {
                e.file_name() != ".artifacts"
            } else {
                true
            }
        });

    for entry in walker {
        let entry = entry.map_err(|e| CoreError::Io(e.into()))?;
        if entry.file_type().is_file() && is_video_extension(entry.path()) {
            out.push(MediaFile::new(to_rel_posix(root, entry.path())?));
        }
    }
    out.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_recursively_and_skips_artifacts_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::create_dir_all(dir.path().join(".artifacts")).unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("sub/b.mkv"), b"x").unwrap();
        std::fs::write(dir.path().join(".artifacts/b.thumbnail.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

        let mut files = walk_media(dir.path(), "", true, None).unwrap();
        files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        let paths: Vec<_> = files.iter().map(|f| f.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["a.mp4", "sub/b.mkv"]);
    }

    #[test]
    fn non_recursive_only_top_level() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("sub/b.mkv"), b"x").unwrap();

        let files = walk_media(dir.path(), "", false, None).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path, "a.mp4");
    }

    #[test]
    fn stem_and_dir() {
        let f = MediaFile::new("Movies/Alien (1979).mp4");
        assert_eq!(f.stem(), "Alien (1979)");
        assert_eq!(f.dir(), "Movies");
        assert_eq!(f.extension(), Some("mp4"));
    }
}
