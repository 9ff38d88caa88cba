//! Event Bus (C8): a broadcast channel of job lifecycle events.
//!
//! Downstream consumers are the SSE handler, the Status Cache invalidator,
//! and the Coverage Aggregator invalidator. A slow subscriber is dropped
//! (it sees a `Lagged` error on its next recv and has to resync by
//! re-querying state), never allowed to stall a publisher.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::artifact::ArtifactKind;
use crate::coverage::CoverageAggregator;
use crate::jobs::{JobId, JobState};
use crate::media::MediaFile;
use crate::status_cache::StatusCache;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Created(JobEventBody),
    Queued(JobEventBody),
    Started(JobEventBody),
    Progress(JobEventBody),
    Current(JobEventBody),
    Finished(JobEventBody),
    Canceled(JobEventBody),
    Error(JobEventBody),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEventBody {
    pub job_id: JobId,
    pub task: String,
    pub artifact: ArtifactKind,
    pub file: Option<String>,
    pub state: JobState,
    pub progress: Option<u8>,
    pub error: Option<String>,
    pub ts: DateTime<Utc>,
}

impl JobEvent {
    pub fn body(&self) -> &JobEventBody {
        match self {
            JobEvent::Created(b)
            | JobEvent::Queued(b)
            | JobEvent::Started(b)
            | JobEvent::Progress(b)
            | JobEvent::Current(b)
            | JobEvent::Finished(b)
            | JobEvent::Canceled(b)
            | JobEvent::Error(b) => b,
        }
    }

    /// The SSE/JSON discriminant, e.g. `"finished"`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            JobEvent::Created(_) => "created",
            JobEvent::Queued(_) => "queued",
            JobEvent::Started(_) => "started",
            JobEvent::Progress(_) => "progress",
            JobEvent::Current(_) => "current",
            JobEvent::Finished(_) => "finished",
            JobEvent::Canceled(_) => "canceled",
            JobEvent::Error(_) => "error",
        }
    }
}

/// The shared publish/subscribe hub. Cheaply `Clone`-able; every clone
/// shares the same underlying broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<JobEvent>,
}

impl EventBus {
    pub fn new(queue_depth: usize) -> Self {
        let (tx, _rx) = broadcast::channel(queue_depth.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Best-effort publish: if there are no subscribers this is a no-op,
    /// and a full channel simply causes the oldest unread message to be
    /// dropped for lagging subscribers rather than blocking the caller.
    pub fn publish(&self, event: JobEvent) {
        let _ = self.tx.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Subscribes to the bus and keeps C3 and C9 fresh: a `finished`, `error`,
/// or `canceled` event invalidates the specific `(file, kind)` status-cache
/// entry and every cached coverage report whose directory covers the file.
/// Runs for the life of the process; a lagged subscriber just resumes from
/// the next event rather than resyncing, since the caches it drives are
/// re-probed on demand anyway.
pub fn spawn_cache_invalidator(
    events: EventBus,
    status_cache: Arc<StatusCache>,
    coverage: Arc<CoverageAggregator>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !matches!(event, JobEvent::Finished(_) | JobEvent::Error(_) | JobEvent::Canceled(_)) {
                        continue;
                    }
                    let body = event.body();
                    let Some(file) = &body.file else { continue };
                    status_cache.invalidate_kind(file, body.artifact);
                    coverage.invalidate(MediaFile::new(file.clone()).dir());
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "cache invalidator lagged behind the event bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body() -> JobEventBody {
        JobEventBody {
            job_id: JobId::new(),
            task: "thumbnail".into(),
            artifact: ArtifactKind::Thumbnail,
            file: Some("a.mp4".into()),
            state: JobState::Running,
            progress: Some(40),
            error: None,
            ts: Utc::now(),
        }
    }

    #[test]
    fn subscribers_receive_published_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(JobEvent::Progress(body()));
        let received = rx.try_recv().unwrap();
        assert_eq!(received.kind_name(), "progress");
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.publish(JobEvent::Created(body()));
        let _ = json!({ "ok": true });
    }

    #[test]
    fn lagging_subscriber_sees_lagged_not_a_block() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.publish(JobEvent::Progress(body()));
        }
        assert!(matches!(rx.try_recv(), Err(broadcast::error::TryRecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn finished_event_invalidates_status_cache_entry() {
        use crate::artifact::ArtifactState;
        use crate::paths::Resolver;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"x").unwrap();
        let resolver = Resolver::new(dir.path());

        let status_cache = Arc::new(StatusCache::new(Duration::from_secs(30), Duration::from_secs(2)));
        let coverage = Arc::new(CoverageAggregator::new(
            Arc::new(Resolver::new(dir.path())),
            Arc::clone(&status_cache),
            Duration::from_secs(30),
        ));

        let file = MediaFile::new("a.mp4");
        // No thumbnail yet: cache remembers Absent for the configured TTL.
        assert_eq!(status_cache.get(&resolver, &file, ArtifactKind::Thumbnail), ArtifactState::Absent);
        std::fs::write(dir.path().join("a.thumbnail.jpg"), b"thumb").unwrap();

        let bus = EventBus::new(16);
        let _handle = spawn_cache_invalidator(bus.clone(), Arc::clone(&status_cache), coverage);

        bus.publish(JobEvent::Finished(body()));

        let mut state = ArtifactState::Absent;
        for _ in 0..50 {
            state = status_cache.get(&resolver, &file, ArtifactKind::Thumbnail);
            if state == ArtifactState::Present {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state, ArtifactState::Present);
    }
}
