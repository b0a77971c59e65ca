//! API handlers.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use smsgate_core::{new_message_id, ProviderId};
use smsgate_engine::{DeadLetterEntry, DEAD_LETTER_LIST};
use smsgate_kv::KvStore;
use smsgate_queue::{Task, TaskQueue};
use smsgate_storage::{RequestFilter, RequestStatus};

use crate::error::ApiError;
use crate::state::SharedState;

const PHONE_MIN: usize = 10;
const PHONE_MAX: usize = 15;
const TEXT_MAX: usize = 160;

#[derive(Debug, Deserialize)]
pub struct SendSmsRequest {
    pub phone: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SendSmsResponse {
    pub success: bool,
    pub message_id: String,
    pub queued: bool,
    pub message: String,
}

fn validate(body: &SendSmsRequest) -> Result<(), ApiError> {
    let phone_len = body.phone.chars().count();
    if !(PHONE_MIN..=PHONE_MAX).contains(&phone_len) {
        return Err(ApiError::Validation(format!(
            "phone must be {PHONE_MIN}-{PHONE_MAX} characters"
        )));
    }
    if !body.phone.chars().all(|c| c.is_ascii_digit() || c == '+') {
        return Err(ApiError::Validation(
            "phone may contain only digits and '+'".to_string(),
        ));
    }
    let text_len = body.text.chars().count();
    if text_len == 0 || text_len > TEXT_MAX {
        return Err(ApiError::Validation(format!(
            "text must be 1-{TEXT_MAX} characters"
        )));
    }
    Ok(())
}

/// `POST /api/sms/send`: validate, admit, and enqueue for dispatch.
pub async fn send_sms(
    State(state): State<SharedState>,
    Json(body): Json<SendSmsRequest>,
) -> Result<Json<SendSmsResponse>, ApiError> {
    validate(&body)?;

    let (allowed, current_count) = state.global_limiter.is_allowed().await;
    if !allowed {
        return Err(ApiError::GlobalRateLimited {
            current_count,
            limit: state.global_limiter.limit(),
        });
    }

    let request = state
        .db
        .create_request(&body.phone, &body.text, state.config.max_retries)
        .await
        .map_err(|err| {
            error!(%err, "failed to persist sms request");
            ApiError::ServiceUnavailable("failed to persist request".to_string())
        })?;

    let message_id = new_message_id();
    state
        .queue
        .enqueue(&Task::Dispatch {
            message_id: message_id.clone(),
            request_id: request.id,
            phone: body.phone.clone(),
            text: body.text.clone(),
            excluded: Vec::new(),
            attempt: 0,
        })
        .await
        .map_err(|err| {
            error!(%err, "failed to enqueue dispatch task");
            ApiError::ServiceUnavailable("failed to queue request".to_string())
        })?;

    // Enqueued: the row leaves `pending` even though no provider is chosen yet.
    if let Err(err) = state
        .db
        .update_request_status(request.id, RequestStatus::Processing, None)
        .await
    {
        error!(request_id = request.id, %err, "failed to mark request processing");
    }

    info!(%message_id, request_id = request.id, "sms queued for dispatch");
    Ok(Json(SendSmsResponse {
        success: true,
        message_id,
        queued: true,
        message: "SMS queued for sending".to_string(),
    }))
}

/// `GET /health`: liveness probe, exempt from rate limiting.
pub async fn liveness() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /api/sms/rate-limits`
pub async fn rate_limits(State(state): State<SharedState>) -> Json<Value> {
    let mut providers = serde_json::Map::new();
    for id in state.providers.ids() {
        let stats = state.rate_limiter.stats(id).await;
        providers.insert(id.to_string(), json!(stats));
    }
    Json(json!({
        "providers": providers,
        "global": state.global_limiter.stats().await,
        "rate_limit_per_provider": state.rate_limiter.limit(),
        "window_seconds": state.rate_limiter.window_seconds(),
    }))
}

/// `GET /api/sms/health`
pub async fn all_provider_health(State(state): State<SharedState>) -> Json<Value> {
    let mut providers = serde_json::Map::new();
    let mut healthy = 0usize;
    for id in state.providers.ids() {
        let status = state.health.health_status_or_default(id).await;
        if status.is_healthy {
            healthy += 1;
        }
        providers.insert(id.to_string(), json!(status));
    }
    let total = state.providers.len();
    Json(json!({
        "providers": providers,
        "summary": {
            "total_providers": total,
            "healthy_providers": healthy,
            "unhealthy_providers": total - healthy,
            "system_healthy": healthy > 0,
        },
        "configuration": {
            "window_duration_seconds": state.health.config().window_seconds(),
            "failure_threshold": state.health.config().failure_threshold(),
        },
    }))
}

fn known_provider(state: &SharedState, provider_id: &str) -> Result<ProviderId, ApiError> {
    let id = ProviderId::from(provider_id);
    if state.providers.contains(&id) {
        Ok(id)
    } else {
        Err(ApiError::NotFound(format!(
            "unknown provider: {provider_id}"
        )))
    }
}

/// `GET /api/sms/health/{provider_id}`
pub async fn provider_health(
    State(state): State<SharedState>,
    Path(provider_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = known_provider(&state, &provider_id)?;
    let status = state.health.health_status_or_default(&id).await;
    let summary = state.db.provider_health(&id).await.map_err(|err| {
        error!(%err, "failed to read provider summary");
        ApiError::Internal("failed to read provider summary".to_string())
    })?;
    Ok(Json(json!({ "sliding_window": status, "summary": summary })))
}

/// `POST /api/sms/health/{provider_id}/reset`
pub async fn reset_provider_health(
    State(state): State<SharedState>,
    Path(provider_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = known_provider(&state, &provider_id)?;
    state.health.reset(&id).await.map_err(|err| {
        error!(%err, "failed to reset provider health");
        ApiError::Internal("failed to reset provider health".to_string())
    })?;
    Ok(Json(json!({ "success": true, "provider_id": id })))
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestsQuery {
    pub status: Option<String>,
    pub provider: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// `GET /api/sms/requests`
pub async fn list_requests(
    State(state): State<SharedState>,
    Query(query): Query<RequestsQuery>,
) -> Result<Json<Value>, ApiError> {
    let status = match &query.status {
        Some(raw) => Some(
            raw.parse::<RequestStatus>()
                .map_err(ApiError::Validation)?,
        ),
        None => None,
    };
    let filter = RequestFilter {
        status,
        provider: query.provider,
        start_time: query.start_time,
        end_time: query.end_time,
        limit: query.limit,
    };
    let requests = state.db.list_requests(&filter).await.map_err(|err| {
        error!(%err, "failed to list requests");
        ApiError::Internal("failed to list requests".to_string())
    })?;
    Ok(Json(json!({ "count": requests.len(), "requests": requests })))
}

/// `GET /api/sms/requests/{id}`
pub async fn get_request(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let request = state
        .db
        .get_request(id)
        .await
        .map_err(|err| {
            error!(%err, "failed to read request");
            ApiError::Internal("failed to read request".to_string())
        })?
        .ok_or_else(|| ApiError::NotFound(format!("request {id} not found")))?;
    let responses = state.db.responses_for(id).await.map_err(|err| {
        error!(%err, "failed to read responses");
        ApiError::Internal("failed to read responses".to_string())
    })?;
    let retries = state.db.retries_for(id).await.map_err(|err| {
        error!(%err, "failed to read retries");
        ApiError::Internal("failed to read retries".to_string())
    })?;
    Ok(Json(
        json!({ "request": request, "responses": responses, "retries": retries }),
    ))
}

/// `GET /api/sms/stats`
pub async fn stats(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let stats = state.db.request_stats().await.map_err(|err| {
        error!(%err, "failed to aggregate stats");
        ApiError::Internal("failed to aggregate stats".to_string())
    })?;
    Ok(Json(json!(stats)))
}

/// `GET /api/sms/distribution-stats`
pub async fn distribution_stats(State(state): State<SharedState>) -> Json<Value> {
    Json(json!(state.distribution.snapshot().await))
}

/// `POST /api/sms/distribution-stats/reset`
pub async fn reset_distribution_stats(State(state): State<SharedState>) -> Json<Value> {
    state.distribution.reset_stats().await;
    Json(json!({ "success": true }))
}

/// `GET /api/sms/queue-status`
pub async fn queue_status(State(state): State<SharedState>) -> Json<Value> {
    let depth = state.queue.depth().await.unwrap_or(0);
    let scheduled = state.queue.scheduled_depth().await.unwrap_or(0);
    let dead_letter_length = state.kv.llen(DEAD_LETTER_LIST).await.unwrap_or(0);
    let recent: Vec<DeadLetterEntry> = state
        .kv
        .lrange(DEAD_LETTER_LIST, 0, 9)
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|raw| serde_json::from_str(raw).ok())
        .collect();

    Json(json!({
        "queue": { "name": smsgate_queue::QUEUE_NAME, "depth": depth, "scheduled": scheduled },
        "dead_letter_queue": { "length": dead_letter_length, "recent": recent },
    }))
}
