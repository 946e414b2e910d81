//! GET /api/ops/events: the persisted operations event log, newest first.

use super::response::internal_error;
use super::{bounded_param, check_rate_limit};
use crate::state::AppState;
use crate::store::{OPS_DEFAULT_LIMIT, OPS_MAX_LIMIT};
use axum::{
    extract::{ConnectInfo, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Deserialize)]
pub struct OpsQuery {
    limit: Option<String>,
}

pub async fn get_ops_events(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<OpsQuery>,
) -> Response {
    if let Some(reject) = check_rate_limit(&state, &headers, peer) {
        return reject;
    }

    let limit = match bounded_param(params.limit.as_deref(), "limit", OPS_DEFAULT_LIMIT, OPS_MAX_LIMIT)
    {
        Ok(limit) => limit,
        Err(response) => return response,
    };

    match state.store.latest_ops_events(limit).await {
        Ok(events) => Json(serde_json::json!({ "events": events })).into_response(),
        Err(e) => internal_error(e),
    }
}
