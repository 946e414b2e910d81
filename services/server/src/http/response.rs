//! JSON error envelope shared by every handler: `{"error":"<message>"}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt::Display;

pub type HttpResponse = Response;

pub(crate) fn json_error(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
        .into_response()
}

pub fn bad_request(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::BAD_REQUEST, message)
}

pub fn unauthorized() -> HttpResponse {
    json_error(StatusCode::UNAUTHORIZED, "unauthorized")
}

pub fn payload_too_large() -> HttpResponse {
    json_error(StatusCode::PAYLOAD_TOO_LARGE, "payload too large")
}

pub fn internal_error(err: impl Display) -> HttpResponse {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

pub fn service_unavailable(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::SERVICE_UNAVAILABLE, message)
}

pub fn not_implemented(message: impl Into<String>) -> HttpResponse {
    json_error(StatusCode::NOT_IMPLEMENTED, message)
}

pub fn too_many_requests() -> HttpResponse {
    json_error(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("body is json")
    }

    #[tokio::test]
    async fn error_envelope_shape() {
        let response = bad_request("bad limit");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, serde_json::json!({"error": "bad limit"}));
    }

    #[tokio::test]
    async fn unauthorized_contract() {
        let response = unauthorized();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await, serde_json::json!({"error": "unauthorized"}));
    }

    #[tokio::test]
    async fn service_unavailable_contract() {
        let response = service_unavailable("insights are warming up");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "insights are warming up"})
        );
    }
}
