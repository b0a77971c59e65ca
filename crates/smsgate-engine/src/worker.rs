//! Worker loops: queue consumption and scheduled-task promotion.
//!
//! Shutdown is cooperative. Each loop watches a [`CancellationToken`]; on
//! cancellation the consumer stops pulling new tasks and returns once the
//! in-flight task (if any) has run to completion.

use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use smsgate_queue::{Task, TaskQueue};

use crate::{run_dispatch, run_send, DispatchJob, EngineContext, SendJob};

/// How long one dequeue call may block on the queue backend.
const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(1);
/// Cadence of the scheduled-task promotion loop.
const PROMOTE_INTERVAL: Duration = Duration::from_secs(1);

/// Execute one task. Errors are logged, never propagated: a single bad task
/// must not take the worker down.
pub async fn handle_task(ctx: &EngineContext, task: Task) {
    match task {
        Task::Dispatch {
            message_id,
            request_id,
            phone,
            text,
            excluded,
            attempt,
        } => {
            let job = DispatchJob {
                message_id,
                request_id,
                phone,
                text,
                excluded,
                attempt,
            };
            if let Err(err) = run_dispatch(ctx, job).await {
                error!(request_id, %err, "dispatch task failed");
            }
        }
        Task::Send {
            message_id,
            request_id,
            phone,
            text,
            provider_id,
            provider_url,
            excluded,
            attempt,
        } => {
            let job = SendJob {
                message_id,
                request_id,
                phone,
                text,
                provider_id,
                provider_url,
                excluded,
                attempt,
            };
            run_send(ctx, job).await;
        }
    }
}

/// Pull and execute tasks until shutdown.
pub async fn run_consumer(ctx: Arc<EngineContext>, shutdown: CancellationToken) {
    info!("worker consumer started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            pulled = ctx.queue.dequeue(DEQUEUE_TIMEOUT) => match pulled {
                Ok(Some(task)) => handle_task(&ctx, task).await,
                Ok(None) => tokio::time::sleep(Duration::from_millis(50)).await,
                Err(err) => {
                    error!(%err, "failed to dequeue task");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            },
        }
    }
    info!("worker consumer stopped");
}

/// Move due scheduled tasks onto the ready list until shutdown.
///
/// Run one of these per deployment; promotion is idempotent across
/// concurrent schedulers but one is enough.
pub async fn run_scheduler(ctx: Arc<EngineContext>, shutdown: CancellationToken) {
    info!("scheduler started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(PROMOTE_INTERVAL) => {
                if let Err(err) = ctx.queue.promote_due(SystemTime::now()).await {
                    error!(%err, "failed to promote scheduled tasks");
                }
            }
        }
    }
    info!("scheduler stopped");
}
