use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use chrono::NaiveDate;
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/:date", get(stream_events))
        .with_state(state)
}

/// SSE bridge over the date channel. Payloads are hints only: consumers
/// re-fetch authoritative state on every event, so a lagged subscriber just
/// keeps reading.
async fn stream_events(
    State(state): State<SharedState>,
    Path(date): Path<NaiveDate>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.notifier.subscribe(date).await;

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Ok(data) = serde_json::to_string(&event) else {
                        continue;
                    };
                    let sse_event = Event::default().event(event.kind.as_str()).data(data);
                    return Some((Ok::<Event, Infallible>(sse_event), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("event subscriber lagged, skipped {}", skipped);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
