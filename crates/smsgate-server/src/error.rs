//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

/// Errors surfaced to API clients.
#[derive(Debug)]
pub enum ApiError {
    /// Input failed validation (422, no persistence).
    Validation(String),
    /// The global window is full (429, structured body).
    GlobalRateLimited { current_count: i64, limit: u32 },
    /// The request could not be queued (503).
    ServiceUnavailable(String),
    /// Unknown resource (404).
    NotFound(String),
    /// Anything else (500).
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(detail) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": detail })),
            )
                .into_response(),
            ApiError::GlobalRateLimited {
                current_count,
                limit,
            } => {
                let remaining = (i64::from(limit) - current_count).max(0);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [
                        ("x-ratelimit-global-limit", limit.to_string()),
                        ("x-ratelimit-global-remaining", remaining.to_string()),
                        ("x-ratelimit-global-reset", "1".to_string()),
                    ],
                    Json(json!({
                        "error": "Global rate limit exceeded",
                        "current_count": current_count,
                        "limit": limit,
                        "reset_in_seconds": 1,
                        "type": "global",
                    })),
                )
                    .into_response()
            }
            ApiError::ServiceUnavailable(detail) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": detail })),
            )
                .into_response(),
            ApiError::NotFound(detail) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": detail }))).into_response()
            }
            ApiError::Internal(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": detail })),
            )
                .into_response(),
        }
    }
}
