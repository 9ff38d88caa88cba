//! Per-file artifact status and the orphan-sidecar repair surface (C1/C2/C3,
//! C10).

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use reelforge_core::artifact::ArtifactKind;
use reelforge_core::media::MediaFile;
use reelforge_core::orphan::{RepairOutcome, RepairSuggestion};

use crate::error::{envelope, AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub path: String,
}

pub async fn status(
    State(state): State<AppState>,
    Query(q): Query<StatusQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let rel_path = state.resolver.canonicalize(&q.path)?;
    if rel_path.is_empty() || !state.resolver.root().join(&rel_path).is_file() {
        return Err(AppError::not_found(format!("file not found: {}", q.path)));
    }
    let file = MediaFile::new(rel_path);

    let mut out = HashMap::new();
    for kind in ArtifactKind::ALL {
        let state_val = state.status_cache.get(&state.resolver, &file, kind);
        out.insert(kind, state_val.is_present());
    }
    Ok(envelope(out))
}

#[derive(Debug, Deserialize)]
pub struct OrphanQuery {
    #[serde(default)]
    pub path: String,
}

pub async fn orphans(
    State(state): State<AppState>,
    Query(q): Query<OrphanQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let dir = state.resolver.canonicalize(&q.path)?;
    let found = state.orphans.scan(&dir)?;
    Ok(envelope(found))
}

#[derive(Debug, Deserialize)]
pub struct RepairPreviewRequest {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub confidence_floor: Option<f64>,
}

pub async fn repair_preview(
    State(state): State<AppState>,
    Json(req): Json<RepairPreviewRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let dir = state.resolver.canonicalize(&req.path)?;
    let floor = req.confidence_floor.unwrap_or(state.config.runtime.orphan_confidence_floor);
    let suggestions = state.orphans.suggest(&dir, floor)?;
    Ok(envelope(suggestions))
}

/// Same computation as [`repair_preview`], streamed one JSON object per line
/// (`application/x-ndjson`) instead of collected into a single array — the
/// Orphan & Repair Engine is built to stream precisely so a library with
/// thousands of orphans doesn't have to wait for the whole scan to finish.
pub async fn repair_preview_stream(
    State(state): State<AppState>,
    Json(req): Json<RepairPreviewRequest>,
) -> AppResult<Response> {
    let dir = state.resolver.canonicalize(&req.path)?;
    let floor = req.confidence_floor.unwrap_or(state.config.runtime.orphan_confidence_floor);

    let orphans = state.orphans.clone();
    let lines = async_stream::stream! {
        let inner = orphans.suggest_stream(&dir, floor);
        futures::pin_mut!(inner);
        while let Some(item) = inner.next().await {
            let line = match item {
                Ok(suggestion) => serde_json::to_string(&suggestion).unwrap_or_default(),
                Err(e) => serde_json::json!({"error": e.to_string()}).to_string(),
            };
            yield Ok::<_, std::io::Error>(format!("{line}\n").into_bytes());
        }
    };

    let body = Body::from_stream(lines);
    Ok((
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        body,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct CleanupQuery {
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub keep_orphans: bool,
    #[serde(default)]
    pub reassociate: bool,
    #[serde(default)]
    pub local_only: bool,
    #[serde(default)]
    pub use_preview: bool,
}

#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct CleanupItem {
    pub sidecar_path: String,
    pub kind: ArtifactKind,
    pub candidate: Option<String>,
    pub confidence: Option<f64>,
    pub outcome: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub orphans_found: usize,
    pub reassociated: usize,
    pub skipped: usize,
    pub items: Vec<CleanupItem>,
}

/// Walks the orphan set and, when `reassociate` is set, applies the
/// highest-confidence repair for each one found at or above the configured
/// floor. `keep_orphans` reports findings without touching the filesystem at
/// all — equivalent to forcing `dry_run`. `local_only` restricts repair
/// candidates to files already discovered under the probed directory, which
/// is always true for this engine, so it is accepted but has no further
/// effect. `use_preview` is accepted for client-side symmetry with
/// `repair-preview` but does not change server behavior.
pub async fn cleanup(
    State(state): State<AppState>,
    Query(q): Query<CleanupQuery>,
    body: Option<Json<CleanupRequest>>,
) -> AppResult<Json<serde_json::Value>> {
    let _ = q.local_only;
    let _ = q.use_preview;
    let path = body.map(|Json(b)| b.path).unwrap_or_default();
    let dir = state.resolver.canonicalize(&path)?;
    let dry_run = q.dry_run || q.keep_orphans;
    let floor = state.config.runtime.orphan_confidence_floor;

    let mut items = Vec::new();
    let mut reassociated = 0usize;
    let mut skipped = 0usize;

    let orphans_found = state.orphans.scan(&dir)?;
    let suggestions: HashMap<_, _> = if q.reassociate {
        state
            .orphans
            .suggest(&dir, floor)?
            .into_iter()
            .map(|s: RepairSuggestion| (s.sidecar_path.clone(), s))
            .collect()
    } else {
        HashMap::new()
    };

    for orphan in orphans_found {
        let Some(suggestion) = suggestions.get(&orphan.sidecar_path) else {
            items.push(CleanupItem {
                sidecar_path: orphan.sidecar_path.display().to_string(),
                kind: orphan.kind,
                candidate: None,
                confidence: None,
                outcome: "no-candidate",
            });
            skipped += 1;
            continue;
        };

        if dry_run {
            items.push(CleanupItem {
                sidecar_path: orphan.sidecar_path.display().to_string(),
                kind: orphan.kind,
                candidate: Some(suggestion.candidate.rel_path.clone()),
                confidence: Some(suggestion.confidence),
                outcome: "proposed",
            });
            continue;
        }

        let outcome = state.orphans.repair(&orphan.sidecar_path, orphan.kind, &suggestion.candidate, false)?;
        match outcome {
            RepairOutcome::Moved => {
                reassociated += 1;
                state.status_cache.invalidate_kind(&suggestion.candidate.rel_path, orphan.kind);
            }
            RepairOutcome::Skipped | RepairOutcome::Failed => skipped += 1,
        }
        items.push(CleanupItem {
            sidecar_path: orphan.sidecar_path.display().to_string(),
            kind: orphan.kind,
            candidate: Some(suggestion.candidate.rel_path.clone()),
            confidence: Some(suggestion.confidence),
            outcome: match outcome {
                RepairOutcome::Moved => "moved",
                RepairOutcome::Skipped => "skipped",
                RepairOutcome::Failed => "failed",
            },
        });
    }

    if !dry_run {
        state.coverage.invalidate(&dir);
    }

    Ok(envelope(CleanupReport {
        dry_run,
        orphans_found: items.len(),
        reassociated,
        skipped,
        items,
    }))
}
