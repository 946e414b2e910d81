//! GET /api/readings: latest-N or time-range queries.

use super::response::{bad_request, internal_error, not_implemented};
use super::{bounded_param, check_rate_limit};
use crate::state::AppState;
use crate::store::{LATEST_DEFAULT_LIMIT, LATEST_MAX_LIMIT};
use axum::{
    extract::{ConnectInfo, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::net::SocketAddr;

const RANGE_DEFAULT_MAX_POINTS: usize = 1000;

/// Range bounds at or above this are taken to be milliseconds and folded
/// down to seconds.
const MS_THRESHOLD: i64 = 1_000_000_000_000;

#[derive(Deserialize)]
pub struct ReadingsQuery {
    from: Option<String>,
    to: Option<String>,
    limit: Option<String>,
    max_points: Option<String>,
}

pub async fn get_readings(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<ReadingsQuery>,
) -> Response {
    if let Some(reject) = check_rate_limit(&state, &headers, peer) {
        return reject;
    }

    match (&params.from, &params.to) {
        (Some(from), Some(to)) => range_response(&state, from, to, params.max_points.as_deref()).await,
        (None, None) => latest_response(&state, params.limit.as_deref()).await,
        _ => bad_request("range queries need both 'from' and 'to'"),
    }
}

async fn latest_response(state: &AppState, limit: Option<&str>) -> Response {
    let limit = match bounded_param(limit, "limit", LATEST_DEFAULT_LIMIT, LATEST_MAX_LIMIT) {
        Ok(limit) => limit,
        Err(response) => return response,
    };
    match state.store.latest(limit).await {
        Ok(readings) => Json(serde_json::json!({ "readings": readings })).into_response(),
        Err(e) => internal_error(e),
    }
}

async fn range_response(
    state: &AppState,
    from: &str,
    to: &str,
    max_points: Option<&str>,
) -> Response {
    let Some(range_store) = state.store.range_capability() else {
        return not_implemented("range queries are not supported by this store");
    };

    let max_points = match bounded_param(max_points, "max_points", RANGE_DEFAULT_MAX_POINTS, LATEST_MAX_LIMIT)
    {
        Ok(max_points) => max_points,
        Err(response) => return response,
    };
    let from = match parse_bound(from, "from") {
        Ok(from) => from,
        Err(response) => return response,
    };
    let to = match parse_bound(to, "to") {
        Ok(to) => to,
        Err(response) => return response,
    };

    match range_store.range(from, to, max_points).await {
        Ok(readings) => Json(serde_json::json!({ "readings": readings })).into_response(),
        Err(e) => internal_error(e),
    }
}

/// Bounds arrive as unix seconds or milliseconds; normalize to seconds.
/// Stored readings keep whatever unit the device used.
fn parse_bound(raw: &str, name: &str) -> Result<i64, Response> {
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| bad_request(format!("'{name}' must be a unix timestamp")))?;
    Ok(if value >= MS_THRESHOLD { value / 1000 } else { value })
}
