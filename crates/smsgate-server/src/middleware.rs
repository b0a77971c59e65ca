//! Rate-limiting middleware over the API routes.
//!
//! Checks the global window on every request and, for SMS endpoints, whether
//! every provider window is already full. Rejections are 429s with the
//! structured bodies and `X-RateLimit-*` headers the clients key on.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::warn;

use crate::state::SharedState;

/// Paths never rate limited (probes and docs).
pub const EXCLUDED_PATHS: &[&str] = &["/health", "/docs", "/openapi.json"];

pub async fn rate_limit(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if EXCLUDED_PATHS.contains(&path.as_str()) {
        return next.run(request).await;
    }

    let (allowed, current_count) = state.global_limiter.is_allowed().await;
    if !allowed {
        warn!(current_count, "global rate limit exceeded in middleware");
        return global_limited(&state, current_count);
    }

    if path.starts_with("/api/sms/") && all_providers_limited(&state).await {
        return providers_limited(&state).await;
    }

    next.run(request).await
}

/// True when no provider window can take another request.
async fn all_providers_limited(state: &SharedState) -> bool {
    for id in state.providers.ids() {
        let (allowed, _) = state.rate_limiter.is_allowed(id).await;
        if allowed {
            return false;
        }
    }
    true
}

fn global_limited(state: &SharedState, current_count: i64) -> Response {
    let limit = state.global_limiter.limit();
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

async fn providers_limited(state: &SharedState) -> Response {
    let mut info = serde_json::Map::new();
    for id in state.providers.ids() {
        let stats = state.rate_limiter.stats(id).await;
        if let Ok(value) = serde_json::to_value(&stats) {
            info.insert(id.to_string(), value);
        }
    }
    warn!("all providers rate limited in middleware");
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({
            "error": "All SMS providers are rate limited",
            "rate_limit_info": info,
            "reset_in_seconds": 1,
            "type": "provider",
        })),
    )
        .into_response()
}
