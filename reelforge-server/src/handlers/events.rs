//! `GET /jobs/events` — the long-lived Server-Sent Events stream over the
//! Event Bus (C8). Deliberately not under `/api/`: it is a streaming
//! transport, not a request/response resource.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tracing::warn;

use crate::state::AppState;

pub async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(event) => {
            let data = serde_json::to_string(event.body()).unwrap_or_default();
            Some(Ok(Event::default().event(event.kind_name()).data(data)))
        }
        Err(err) => {
            warn!(error = %err, "job event subscriber lagged, dropping missed events");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"))
}
