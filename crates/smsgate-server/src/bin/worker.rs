//! The queue worker: consumers plus the scheduled-task promotion loop.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use smsgate_engine::{worker, EngineContext, RetryPolicy};
use smsgate_server::{init_tracing, AppState, BootstrapError, Config};

#[tokio::main]
async fn main() -> Result<(), BootstrapError> {
    let config = Config::from_env();
    init_tracing(config.debug);

    let state = AppState::connect(config).await?;
    let retry = RetryPolicy::builder()
        .max_retries(state.config.max_retries)
        .base_delay(state.config.retry_base_delay)
        .max_delay(state.config.retry_max_delay)
        .build();
    let ctx = Arc::new(EngineContext::new(
        state.providers.clone(),
        state.kv.clone(),
        state.db.clone(),
        state.queue.clone(),
        reqwest::Client::new(),
        state.health.clone(),
        state.distribution.clone(),
        retry,
    ));

    let shutdown = CancellationToken::new();
    let mut handles = Vec::new();
    handles.push(tokio::spawn(worker::run_scheduler(
        ctx.clone(),
        shutdown.clone(),
    )));
    for _ in 0..state.config.worker_concurrency {
        handles.push(tokio::spawn(worker::run_consumer(
            ctx.clone(),
            shutdown.clone(),
        )));
    }
    info!(
        consumers = state.config.worker_concurrency,
        "sms worker started"
    );

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received, draining workers");
    }
    shutdown.cancel();
    for handle in handles {
        let _ = handle.await;
    }
    info!("sms worker stopped");
    Ok(())
}
