//! Server-Sent Events for domain events

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

/// GET /api/events - SSE stream of room, allocation and verification events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    seatgate_common::sse::create_event_sse_stream(&state.bus, "seatgate")
}
