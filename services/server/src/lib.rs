pub mod auth;
pub mod config;
pub mod db;
pub mod http;
pub mod hub;
pub mod insights;
pub mod ops;
pub mod ratelimit;
pub mod repo;
pub mod retention;
pub mod state;
pub mod store;

#[cfg(test)]
pub(crate) mod testsupport;

pub use state::AppState;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Single-reading ingest body cap (1 MiB).
const INGEST_BODY_CAP: usize = 1 << 20;
/// Batch ingest body cap (4 MiB).
const BATCH_BODY_CAP: usize = 4 << 20;

pub fn build_router(state: AppState, cors_allow_origin: &str) -> Router {
    Router::new()
        .route(
            "/api/ingest",
            post(http::ingest::ingest_reading).layer(DefaultBodyLimit::max(INGEST_BODY_CAP)),
        )
        .route(
            "/api/ingest/batch",
            post(http::ingest::ingest_batch).layer(DefaultBodyLimit::max(BATCH_BODY_CAP)),
        )
        .route("/api/readings", get(http::readings::get_readings))
        .route("/api/stream", get(http::stream::stream_readings))
        .route("/api/insights", get(http::insights::get_insights))
        .route("/api/ops/events", get(http::ops::get_ops_events))
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .layer(cors_layer(cors_allow_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `*` allows any origin; otherwise a comma-separated list of exact origins
/// (the layer echoes the matching origin and adds `Vary: Origin`).
fn cors_layer(allow_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allow_origin.trim() == "*" {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allow_origin
            .split(',')
            .filter_map(|origin| origin.trim().parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

mod health {
    use crate::http::response::service_unavailable;
    use crate::state::AppState;
    use axum::extract::State;
    use axum::response::{IntoResponse, Response};
    use std::time::Duration;

    const PING_TIMEOUT: Duration = Duration::from_secs(2);

    pub async fn health() -> impl IntoResponse {
        "ok"
    }

    pub async fn ready(State(state): State<AppState>) -> Response {
        match tokio::time::timeout(PING_TIMEOUT, state.store.ping()).await {
            Ok(Ok(())) => "ok".into_response(),
            Ok(Err(e)) => service_unavailable(format!("database unavailable: {e}")),
            Err(_) => service_unavailable("database ping timed out"),
        }
    }
}
