//! Ingest handlers: the hot path a device's retry queue depends on.
//!
//! Order within one request is fixed: authenticate, decode, persist, then
//! the non-blocking notifications (liveness, stream fan-out, insights).
//! Only the store write can delay the 202; everything after it either runs
//! synchronously without I/O or is spawned.

use super::response::{bad_request, internal_error, payload_too_large, unauthorized};
use crate::auth::api_key_matches;
use crate::state::AppState;
use aeris_protocol::{decode_reading, decode_readings_batch};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

pub const MAX_BATCH_SIZE: usize = 1000;

fn authenticate(state: &AppState, headers: &HeaderMap) -> bool {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|presented| api_key_matches(presented, &state.ingest_api_key))
}

fn unwrap_body(body: Result<Bytes, BytesRejection>) -> Result<Bytes, Response> {
    body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            payload_too_large()
        } else {
            bad_request(rejection.body_text())
        }
    })
}

/// POST /api/ingest
pub async fn ingest_reading(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if !authenticate(&state, &headers) {
        return unauthorized();
    }
    let body = match unwrap_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let reading = match decode_reading(&body) {
        Ok(reading) => reading,
        Err(e) => return bad_request(e.to_string()),
    };

    if let Err(e) = state.store.add(&reading).await {
        return internal_error(e);
    }

    state.monitor.note_ingest(chrono::Utc::now().timestamp_millis());
    state.hub.publish(&reading);
    if let Some(insights) = &state.insights {
        insights.on_reading(&reading);
    }

    (StatusCode::ACCEPTED, Json(serde_json::json!({"status": "accepted"}))).into_response()
}

/// POST /api/ingest/batch
pub async fn ingest_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if !authenticate(&state, &headers) {
        return unauthorized();
    }
    let body = match unwrap_body(body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    let readings = match decode_readings_batch(&body, MAX_BATCH_SIZE) {
        Ok(readings) => readings,
        Err(e) => return bad_request(e.to_string()),
    };

    if let Err(e) = state.store.add_batch(&readings).await {
        return internal_error(e);
    }

    state.monitor.note_ingest(chrono::Utc::now().timestamp_millis());
    // Publish order must match array order for every subscriber.
    for reading in &readings {
        state.hub.publish(reading);
    }
    if let Some(insights) = &state.insights {
        insights.on_batch(&readings);
    }

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"status": "accepted", "ingested": readings.len()})),
    )
        .into_response()
}
