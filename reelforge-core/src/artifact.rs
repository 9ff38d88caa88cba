//! The closed set of derived artifact kinds and their declared properties.
//!
//! An [`ArtifactKind`] is the single source of truth other components key
//! off of: the Resolver uses it to pick a sidecar template, the Scheduler
//! uses its [`ToolClass`] to derate concurrency, the Probe uses its
//! staleness rule.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical, plural artifact kind names. Singular forms (`heatmap`,
/// `scene`) are never used as wire values or sidecar template keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Metadata,
    Thumbnail,
    Preview,
    Sprites,
    Heatmaps,
    Markers,
    Subtitles,
    Faces,
    Embeddings,
    Phash,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 10] = [
        ArtifactKind::Metadata,
        ArtifactKind::Thumbnail,
        ArtifactKind::Preview,
        ArtifactKind::Sprites,
        ArtifactKind::Heatmaps,
        ArtifactKind::Markers,
        ArtifactKind::Subtitles,
        ArtifactKind::Faces,
        ArtifactKind::Embeddings,
        ArtifactKind::Phash,
    ];

    /// Fast-first ordering used by the batch planner when a composite
    /// "all missing artifacts" operation is expanded.
    pub const FAST_FIRST_ORDER: [ArtifactKind; 10] = [
        ArtifactKind::Metadata,
        ArtifactKind::Phash,
        ArtifactKind::Thumbnail,
        ArtifactKind::Preview,
        ArtifactKind::Sprites,
        ArtifactKind::Heatmaps,
        ArtifactKind::Markers,
        ArtifactKind::Faces,
        ArtifactKind::Embeddings,
        ArtifactKind::Subtitles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Metadata => "metadata",
            ArtifactKind::Thumbnail => "thumbnail",
            ArtifactKind::Preview => "preview",
            ArtifactKind::Sprites => "sprites",
            ArtifactKind::Heatmaps => "heatmaps",
            ArtifactKind::Markers => "markers",
            ArtifactKind::Subtitles => "subtitles",
            ArtifactKind::Faces => "faces",
            ArtifactKind::Embeddings => "embeddings",
            ArtifactKind::Phash => "phash",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Some(match s {
            "metadata" => ArtifactKind::Metadata,
            "thumbnail" => ArtifactKind::Thumbnail,
            "preview" => ArtifactKind::Preview,
            "sprites" => ArtifactKind::Sprites,
            "heatmaps" => ArtifactKind::Heatmaps,
            "markers" => ArtifactKind::Markers,
            "subtitles" => ArtifactKind::Subtitles,
            "faces" => ArtifactKind::Faces,
            "embeddings" => ArtifactKind::Embeddings,
            "phash" => ArtifactKind::Phash,
            _ => return None,
        })
    }

    /// Source-tool class used by the Scheduler for per-tool concurrency caps.
    pub fn tool_class(&self) -> ToolClass {
        match self {
            ArtifactKind::Metadata => ToolClass::Ffprobe,
            ArtifactKind::Thumbnail
            | ArtifactKind::Preview
            | ArtifactKind::Sprites
            | ArtifactKind::Heatmaps
            | ArtifactKind::Markers => ToolClass::Ffmpeg,
            ArtifactKind::Subtitles => ToolClass::SubtitleBackend,
            ArtifactKind::Faces | ArtifactKind::Embeddings => ToolClass::FaceBackend,
            ArtifactKind::Phash => ToolClass::Pure,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Logical grouping of workers sharing an external resource, for per-tool
/// concurrency control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolClass {
    Ffmpeg,
    Ffprobe,
    SubtitleBackend,
    FaceBackend,
    Pure,
}

impl ToolClass {
    pub const ALL: [ToolClass; 5] = [
        ToolClass::Ffmpeg,
        ToolClass::Ffprobe,
        ToolClass::SubtitleBackend,
        ToolClass::FaceBackend,
        ToolClass::Pure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolClass::Ffmpeg => "ffmpeg",
            ToolClass::Ffprobe => "ffprobe",
            ToolClass::SubtitleBackend => "subtitle-backend",
            ToolClass::FaceBackend => "face-backend",
            ToolClass::Pure => "pure",
        }
    }

    /// The external binary this tool class depends on, if any. Used by the
    /// tool-detection endpoint and by the Planner's `tool-missing` check.
    pub fn required_binary(&self) -> Option<&'static str> {
        match self {
            ToolClass::Ffmpeg => Some("ffmpeg"),
            ToolClass::Ffprobe => Some("ffprobe"),
            ToolClass::SubtitleBackend | ToolClass::FaceBackend | ToolClass::Pure => None,
        }
    }
}

/// State of a single (MediaFile, ArtifactKind) pair, as reported through the
/// API and cached by C3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Absent,
    Present,
    Stale,
    Generating,
    Failed,
}

impl ArtifactState {
    pub fn is_present(&self) -> bool {
        matches!(self, ArtifactState::Present)
    }
}
