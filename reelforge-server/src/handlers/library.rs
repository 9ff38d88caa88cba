//! `GET /api/library` — out of scope as a feature (tags, performers,
//! playback are owned by another collaborator service), kept here only so
//! the `path` query semantics the Planner and Coverage Aggregator rely on
//! have a real endpoint backing them during local development.

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use reelforge_core::media::walk_media;

use crate::error::{envelope, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LibraryQuery {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub recursive: Option<bool>,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub search: Option<String>,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct LibraryEntry {
    pub path: String,
    pub stem: String,
    pub extension: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LibraryPage {
    pub path: String,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub entries: Vec<LibraryEntry>,
}

pub async fn list_library(
    State(state): State<AppState>,
    Query(q): Query<LibraryQuery>,
) -> AppResult<axum::Json<serde_json::Value>> {
    let dir = state.resolver.canonicalize(&q.path)?;
    let mut files = walk_media(state.resolver.root(), &dir, q.recursive.unwrap_or(true), None)?;

    if let Some(search) = q.search.as_deref().filter(|s| !s.is_empty()) {
        let needle = search.to_lowercase();
        files.retain(|f| f.rel_path.to_lowercase().contains(&needle));
    }

    let total = files.len();
    let page = q.page.max(1);
    let page_size = q.page_size.max(1);
    let start = (page - 1) * page_size;
    let entries = files
        .into_iter()
        .skip(start)
        .take(page_size)
        .map(|f| LibraryEntry {
            stem: f.stem().to_string(),
            extension: f.extension().map(str::to_string),
            path: f.rel_path,
        })
        .collect();

    Ok(envelope(LibraryPage { path: dir, page, page_size, total, entries }))
}
