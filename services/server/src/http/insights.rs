//! GET /api/insights: the current snapshot, if the engine has produced one.

use super::response::service_unavailable;
use super::{bounded_param, check_rate_limit};
use crate::config::MAX_INSIGHTS_HARD_CAP;
use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, Query, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Deserialize)]
pub struct InsightsQuery {
    limit: Option<String>,
}

pub async fn get_insights(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(params): Query<InsightsQuery>,
) -> Response {
    if let Some(reject) = check_rate_limit(&state, &headers, peer) {
        return reject;
    }

    let Some(engine) = &state.insights else {
        return service_unavailable("insights engine is not configured");
    };

    let limit = match bounded_param(
        params.limit.as_deref(),
        "limit",
        MAX_INSIGHTS_HARD_CAP,
        MAX_INSIGHTS_HARD_CAP,
    ) {
        Ok(limit) => limit,
        Err(response) => return response,
    };

    match engine.snapshot(limit) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => service_unavailable("insights are warming up"),
    }
}
