//! The dispatch task: select a provider, persist the choice, enqueue a send.

use tracing::{error, info, warn};

use smsgate_core::ProviderId;
use smsgate_queue::{Task, TaskQueue};
use smsgate_storage::RequestStatus;

use crate::{EngineContext, EngineError};

/// Inputs to one dispatch execution.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub message_id: String,
    pub request_id: i64,
    pub phone: String,
    pub text: String,
    /// Providers that already failed for this request, in failure order.
    pub excluded: Vec<ProviderId>,
    /// 0-based attempt number.
    pub attempt: u32,
}

/// What the dispatcher did with the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A send task was enqueued for this provider.
    Enqueued(ProviderId),
    /// No provider could take the request; it stays `processing` and nothing
    /// further is enqueued from this path.
    NoProvider,
}

/// Select a provider at execution time and hand the message to the sender.
pub async fn run_dispatch(
    ctx: &EngineContext,
    job: DispatchJob,
) -> Result<DispatchOutcome, EngineError> {
    let Some((provider_id, provider_url)) = ctx.distribution.select(&job.excluded).await else {
        warn!(
            message_id = %job.message_id,
            request_id = job.request_id,
            attempt = job.attempt,
            "no provider available at execution time; request remains processing"
        );
        return Ok(DispatchOutcome::NoProvider);
    };

    // Persistence is observability; a failed row update must not stop the send.
    if let Err(err) = ctx
        .db
        .update_request_status(job.request_id, RequestStatus::Processing, Some(&provider_id))
        .await
    {
        error!(
            request_id = job.request_id,
            %err,
            "failed to update request before send"
        );
    }

    ctx.queue
        .enqueue(&Task::Send {
            message_id: job.message_id.clone(),
            request_id: job.request_id,
            phone: job.phone,
            text: job.text,
            provider_id: provider_id.clone(),
            provider_url,
            excluded: job.excluded,
            attempt: job.attempt,
        })
        .await?;

    info!(
        message_id = %job.message_id,
        provider = %provider_id,
        attempt = job.attempt,
        "dispatched message to provider"
    );
    Ok(DispatchOutcome::Enqueued(provider_id))
}
