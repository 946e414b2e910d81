//! GET /api/stream: live readings over server-sent events.
//!
//! The subscription guard is owned by the event stream closure, so client
//! disconnect (which drops the stream) unsubscribes from the hub
//! automatically.

use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, HeaderValue},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

pub async fn stream_readings(State(state): State<AppState>) -> Response {
    let (rx, subscription) = state.hub.subscribe();

    let stream = ReceiverStream::new(rx).filter_map(move |reading| {
        let _owned = &subscription;
        match serde_json::to_string(&reading) {
            Ok(json) => Some(Ok::<Event, Infallible>(Event::default().event("reading").data(json))),
            Err(_) => None,
        }
    });

    let mut response = Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(HEARTBEAT_INTERVAL)
                .text("ping"),
        )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    // Disable nginx response buffering; SSE must flush per event.
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
