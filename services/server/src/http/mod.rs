pub mod ingest;
pub mod insights;
pub mod ops;
pub mod readings;
pub mod response;
pub mod stream;

use crate::ratelimit::client_identity;
use crate::state::AppState;
use axum::http::HeaderMap;
use std::net::SocketAddr;

/// Shared rate-limit gate for the read endpoints; `Some` is the 429 to
/// return.
pub(crate) fn check_rate_limit(
    state: &AppState,
    headers: &HeaderMap,
    peer: SocketAddr,
) -> Option<response::HttpResponse> {
    let identity = client_identity(headers, peer, state.trust_proxy_headers);
    if state.limiter.allow(&identity) {
        None
    } else {
        Some(response::too_many_requests())
    }
}

/// Parse an optional query parameter into a bounded integer, with a named
/// 400 on anything out of range.
pub(crate) fn bounded_param(
    raw: Option<&str>,
    name: &str,
    default: usize,
    max: usize,
) -> Result<usize, response::HttpResponse> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<usize>() {
        Ok(value) if (1..=max).contains(&value) => Ok(value),
        _ => Err(response::bad_request(format!(
            "'{name}' must be an integer between 1 and {max}"
        ))),
    }
}
