//! Job record data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::artifact::ArtifactKind;

/// Opaque, time-sortable job identifier. Backed by a UUIDv7 so lexical and
/// creation order agree without a separate sequence counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Monotonic job state graph: queued → starting → running →
/// (completed|failed|canceled); queued → canceled directly. The terminal
/// states never transition further.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Starting,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Canceled)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, JobState::Starting | JobState::Running)
    }

    /// Whether `self -> next` is a legal edge in the declared state graph.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Queued, Starting) | (Queued, Canceled) | (Starting, Running) | (Starting, Canceled)
                | (Starting, Failed) | (Running, Completed) | (Running, Failed) | (Running, Canceled)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Queued => "queued",
            JobState::Starting => "starting",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

/// A single job record. Owned exclusively by the Job Record Store; mutated
/// only through state transitions issued by the Scheduler / Event Bus
/// application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub task: String,
    pub target: Option<String>,
    pub params: serde_json::Value,
    pub state: JobState,
    pub paused: bool,
    pub created: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
    pub progress: Option<u8>,
    pub processed: u64,
    pub total: u64,
    pub error: Option<String>,
    pub result: Option<serde_json::Value>,
    pub artifact: ArtifactKind,
}

impl Job {
    pub fn new(artifact: ArtifactKind, target: Option<String>, params: serde_json::Value) -> Self {
        Self {
            id: JobId::new(),
            task: artifact.as_str().to_string(),
            target,
            params,
            state: JobState::Queued,
            paused: false,
            created: Utc::now(),
            started: None,
            ended: None,
            progress: None,
            processed: 0,
            total: 0,
            error: None,
            result: None,
            artifact,
        }
    }

    /// `(target, artifact)` — the claim key the Scheduler uses to prevent
    /// two active jobs from touching the same sidecar concurrently.
    pub fn claim_key(&self) -> Option<(String, ArtifactKind)> {
        self.target.clone().map(|t| (t, self.artifact))
    }
}
