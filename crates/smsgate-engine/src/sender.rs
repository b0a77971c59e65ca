//! The send task: one upstream HTTP attempt and its bookkeeping.

use serde_json::json;
use std::time::{Duration, SystemTime};
use tracing::{error, info, warn};

use smsgate_core::ProviderId;
use smsgate_kv::KvStore;
use smsgate_queue::{Task, TaskQueue};
use smsgate_storage::RequestStatus;

use crate::{DeadLetterEntry, EngineContext, DEAD_LETTER_LIST};

/// Synthesized status for an upstream timeout.
const TIMEOUT_STATUS: u16 = 408;
/// Synthesized status for transport and other unexpected errors.
const ERROR_STATUS: u16 = 500;

/// Inputs to one send execution.
#[derive(Debug, Clone)]
pub struct SendJob {
    pub message_id: String,
    pub request_id: i64,
    pub phone: String,
    pub text: String,
    pub provider_id: ProviderId,
    pub provider_url: String,
    /// Providers that already failed for this request, in failure order.
    pub excluded: Vec<ProviderId>,
    /// 0-based attempt number.
    pub attempt: u32,
}

/// Terminal result of one send execution.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Upstream accepted the message; the request is `completed`.
    Sent,
    /// The attempt failed and a dispatch was scheduled after backoff.
    RetryScheduled { delay_seconds: f64 },
    /// The attempt failed and no retry remains; the request is dead-lettered.
    PermanentlyFailed,
}

/// POST the message to the chosen provider and absorb the outcome.
///
/// This function never propagates errors: every failure mode folds into the
/// retry/dead-letter flow, and storage problems are logged without stopping
/// the pipeline.
pub async fn run_send(ctx: &EngineContext, job: SendJob) -> SendOutcome {
    info!(
        message_id = %job.message_id,
        provider = %job.provider_id,
        attempt = job.attempt,
        "sending sms to provider"
    );

    let payload = json!({ "phone": job.phone, "text": job.text });
    let result = ctx
        .http
        .post(&job.provider_url)
        .json(&payload)
        .timeout(ctx.send_timeout)
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            on_success(ctx, &job, status, &body).await;
            SendOutcome::Sent
        }
        Ok(response) => {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            let error_message = format!("HTTP {status}: {body}");
            warn!(
                message_id = %job.message_id,
                provider = %job.provider_id,
                status,
                "sms send failed"
            );
            on_failure(ctx, &job, status, body, error_message).await
        }
        Err(err) if err.is_timeout() => {
            error!(
                message_id = %job.message_id,
                provider = %job.provider_id,
                %err,
                "timeout sending sms"
            );
            let detail = format!("Timeout: {err}");
            on_failure(ctx, &job, TIMEOUT_STATUS, detail.clone(), detail).await
        }
        Err(err) => {
            error!(
                message_id = %job.message_id,
                provider = %job.provider_id,
                %err,
                "unexpected error sending sms"
            );
            let detail = format!("Unexpected error: {err}");
            on_failure(ctx, &job, ERROR_STATUS, detail.clone(), detail).await
        }
    }
}

async fn on_success(ctx: &EngineContext, job: &SendJob, status: u16, body: &str) {
    if let Err(err) = ctx.health.record_success(&job.provider_id).await {
        warn!(provider = %job.provider_id, %err, "failed to record success sample");
    }
    if let Err(err) = ctx.db.create_response(job.request_id, body, status).await {
        error!(request_id = job.request_id, %err, "failed to persist response");
    }
    if let Err(err) = ctx
        .db
        .update_request_status(job.request_id, RequestStatus::Completed, Some(&job.provider_id))
        .await
    {
        error!(request_id = job.request_id, %err, "failed to complete request");
    }
    if let Err(err) = ctx.db.record_provider_result(&job.provider_id, true).await {
        error!(provider = %job.provider_id, %err, "failed to update provider summary");
    }
    info!(
        message_id = %job.message_id,
        provider = %job.provider_id,
        "sms sent successfully"
    );
}

async fn on_failure(
    ctx: &EngineContext,
    job: &SendJob,
    status: u16,
    response_data: String,
    error_message: String,
) -> SendOutcome {
    if let Err(err) = ctx
        .db
        .create_response(job.request_id, &response_data, status)
        .await
    {
        error!(request_id = job.request_id, %err, "failed to persist response");
    }
    if let Err(err) = ctx.health.record_failure(&job.provider_id).await {
        warn!(provider = %job.provider_id, %err, "failed to record failure sample");
    }
    if let Err(err) = ctx.db.record_provider_result(&job.provider_id, false).await {
        error!(provider = %job.provider_id, %err, "failed to update provider summary");
    }

    if job.attempt >= ctx.retry.max_retries() {
        return dead_letter(ctx, job, "Max retries exceeded").await;
    }

    let mut failed = job.excluded.clone();
    if !failed.contains(&job.provider_id) {
        failed.push(job.provider_id.clone());
    }

    // Every configured provider has now failed this request; a dispatch with
    // a saturated exclusion list could never select, so end it here.
    if ctx.providers.ids().all(|id| failed.contains(id)) {
        return dead_letter(ctx, job, "All providers exhausted").await;
    }

    let next_attempt = job.attempt + 1;
    let delay_seconds = ctx.retry.backoff_delay(next_attempt);

    if let Err(err) = ctx
        .db
        .record_retry(
            job.request_id,
            next_attempt,
            &job.provider_id,
            &error_message,
            delay_seconds as i64,
        )
        .await
    {
        error!(request_id = job.request_id, %err, "failed to record retry row");
    }
    if let Err(err) = ctx
        .db
        .update_retry_state(job.request_id, next_attempt, &failed)
        .await
    {
        error!(request_id = job.request_id, %err, "failed to update retry state");
    }

    let dispatch = Task::Dispatch {
        message_id: job.message_id.clone(),
        request_id: job.request_id,
        phone: job.phone.clone(),
        text: job.text.clone(),
        excluded: failed,
        attempt: next_attempt,
    };
    let at = SystemTime::now() + Duration::from_secs_f64(delay_seconds);

    match ctx.queue.enqueue_at(&dispatch, at).await {
        Ok(()) => {
            info!(
                message_id = %job.message_id,
                attempt = next_attempt,
                delay_seconds,
                "retry scheduled"
            );
        }
        Err(err) => {
            // Losing the scheduled slot is worse than retrying early.
            error!(%err, "failed to schedule retry, falling back to immediate enqueue");
            if let Err(err) = ctx.queue.enqueue(&dispatch).await {
                error!(
                    message_id = %job.message_id,
                    %err,
                    "immediate enqueue failed as well; retry is lost"
                );
            }
        }
    }

    SendOutcome::RetryScheduled { delay_seconds }
}

async fn dead_letter(ctx: &EngineContext, job: &SendJob, reason: &str) -> SendOutcome {
    let entry = DeadLetterEntry {
        request_id: job.request_id,
        reason: reason.to_string(),
    };
    match serde_json::to_string(&entry) {
        Ok(payload) => {
            if let Err(err) = ctx.kv.lpush(DEAD_LETTER_LIST, &payload).await {
                error!(request_id = job.request_id, %err, "failed to push dead-letter entry");
            }
        }
        Err(err) => {
            error!(request_id = job.request_id, %err, "failed to serialize dead-letter entry");
        }
    }
    if let Err(err) = ctx.db.mark_permanently_failed(job.request_id).await {
        error!(request_id = job.request_id, %err, "failed to mark request permanently failed");
    }
    warn!(
        message_id = %job.message_id,
        request_id = job.request_id,
        reason,
        "request permanently failed"
    );
    SendOutcome::PermanentlyFailed
}
