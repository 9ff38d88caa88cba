//! Coverage, batch submission, job inspection/cancellation, and the
//! scheduler's pause/concurrency controls (C6, C7, C9).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use reelforge_core::artifact::ArtifactKind;
use reelforge_core::jobs::JobId;
use reelforge_core::planner::BatchRequest;

use crate::error::{envelope, AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CoverageQuery {
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_true")]
    pub recursive: bool,
}

fn default_true() -> bool {
    true
}

pub async fn coverage(
    State(state): State<AppState>,
    Query(q): Query<CoverageQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let dir = state.resolver.canonicalize(&q.path)?;
    let report = state.coverage.coverage(&dir, q.recursive).await?;
    Ok(envelope(report))
}

pub async fn submit_batch(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let result = state.planner.submit(req)?;
    if result.enqueued.len() + result.cleared > 0 {
        state.coverage.invalidate("");
    }
    Ok(envelope(json!({
        "fileCount": result.files_considered,
        "batchId": Uuid::now_v7(),
        "enqueued": result.enqueued,
        "skippedExistingClaim": result.skipped_existing_claim,
        "cleared": result.cleared,
    })))
}

pub async fn list_jobs(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let paused = state.scheduler.is_paused();
    let jobs: Vec<serde_json::Value> = state
        .store
        .list()
        .into_iter()
        .map(|job| {
            let mut value = serde_json::to_value(&job).unwrap_or_default();
            if paused && job.state == reelforge_core::jobs::JobState::Queued {
                if let Some(obj) = value.as_object_mut() {
                    obj.insert("paused".to_string(), json!(true));
                }
            }
            value
        })
        .collect();
    let stats = state.store.stats();
    Ok(envelope(json!({ "jobs": jobs, "stats": stats })))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let job_id: JobId = id.parse().map_err(|_| AppError::bad_request(format!("invalid job id: {id}")))?;
    state.scheduler.cancel(job_id)?;
    Ok(envelope(json!({ "id": job_id })))
}

pub async fn cancel_queued(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let ids = state.scheduler.cancel_queued_all();
    Ok(envelope(json!({ "canceled": ids })))
}

pub async fn cancel_all(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let queued = state.scheduler.cancel_queued_all();
    let active = state.scheduler.cancel_all_active();
    Ok(envelope(json!({ "canceledQueued": queued, "signaledActive": active })))
}

pub async fn clear_completed(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let removed = state.store.clear_finished();
    Ok(envelope(json!({ "removed": removed })))
}

pub async fn get_concurrency(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    Ok(envelope(state.scheduler.status()))
}

#[derive(Debug, Deserialize)]
pub struct ConcurrencyQuery {
    pub value: usize,
}

pub async fn set_concurrency(
    State(state): State<AppState>,
    Query(q): Query<ConcurrencyQuery>,
) -> AppResult<Json<serde_json::Value>> {
    state.scheduler.set_global_max_concurrency(q.value)?;
    Ok(envelope(state.scheduler.status()))
}

pub async fn get_pause(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    Ok(envelope(json!({ "paused": state.scheduler.is_paused() })))
}

#[derive(Debug, Deserialize)]
pub struct PauseQuery {
    pub paused: bool,
}

pub async fn set_pause(
    State(state): State<AppState>,
    Query(q): Query<PauseQuery>,
) -> AppResult<Json<serde_json::Value>> {
    if q.paused {
        state.scheduler.pause();
    } else {
        state.scheduler.resume();
    }
    Ok(envelope(json!({ "paused": state.scheduler.is_paused() })))
}

#[derive(Debug, Serialize)]
struct ToolAvailability {
    kind: ArtifactKind,
    tool_class: &'static str,
    available: bool,
}

pub async fn list_tools(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    let mut tools = Vec::new();
    for kind in ArtifactKind::ALL {
        let Some(worker) = state.registry.get(kind) else { continue };
        tools.push(ToolAvailability {
            kind,
            tool_class: worker.tool_class().as_str(),
            available: worker.tool_available(),
        });
    }
    Ok(envelope(tools))
}
