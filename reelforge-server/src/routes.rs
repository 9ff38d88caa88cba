//! Router assembly. One function, so `main.rs` and integration tests build
//! the identical route table.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{artifacts, events, health, library, tasks};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/library", get(library::list_library))
        .route("/artifacts/status", get(artifacts::status))
        .route("/artifacts/orphans", get(artifacts::orphans))
        .route("/artifacts/repair-preview", post(artifacts::repair_preview))
        .route("/artifacts/repair-preview/stream", post(artifacts::repair_preview_stream))
        .route("/artifacts/cleanup", post(artifacts::cleanup))
        .route("/tasks/coverage", get(tasks::coverage))
        .route("/tasks/batch", post(tasks::submit_batch))
        .route("/tasks/jobs", get(tasks::list_jobs))
        .route("/tasks/jobs/{id}/cancel", post(tasks::cancel_job))
        .route("/tasks/jobs/cancel-queued", post(tasks::cancel_queued))
        .route("/tasks/jobs/cancel-all", post(tasks::cancel_all))
        .route("/tasks/jobs/clear-completed", post(tasks::clear_completed))
        .route("/tasks/concurrency", get(tasks::get_concurrency).post(tasks::set_concurrency))
        .route("/tasks/pause", get(tasks::get_pause).post(tasks::set_pause))
        .route("/tasks/tools", get(tasks::list_tools));

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/jobs/events", get(events::stream_events))
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
