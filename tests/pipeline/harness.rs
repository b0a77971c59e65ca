//! Shared wiring: a full gateway over in-memory backends and a mockito
//! provider cluster.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use smsgate_engine::{worker, EngineContext, RetryPolicy};
use smsgate_kv::{KvStore, MemoryStore};
use smsgate_queue::{MemoryQueue, TaskQueue};
use smsgate_server::{AppState, Config, SharedState};
use smsgate_storage::Database;

pub struct Harness {
    pub state: SharedState,
    pub ctx: EngineContext,
    pub kv: Arc<MemoryStore>,
    pub queue: Arc<MemoryQueue>,
}

/// Build a gateway whose three providers live on the given mockito server
/// under `/provider1..3`, with deterministic (jitter-free) backoff.
pub async fn gateway(provider_base: &str, max_retries: u32) -> Harness {
    let kv_store = Arc::new(MemoryStore::new());
    let kv: Arc<dyn KvStore> = kv_store.clone();
    let queue_impl = Arc::new(MemoryQueue::new());
    let queue: Arc<dyn TaskQueue> = queue_impl.clone();

    let config = Config {
        provider1_url: format!("{provider_base}/provider1"),
        provider2_url: format!("{provider_base}/provider2"),
        provider3_url: format!("{provider_base}/provider3"),
        rate_limit_middleware: false,
        max_retries,
        // Refresh selector status on every selection so health changes are
        // visible immediately.
        health_check_interval: 0,
        ..Config::default()
    };

    let db = Database::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    db.seed_providers(&config.providers()).await.unwrap();

    let state = AppState::assemble(config, kv.clone(), db, queue);

    let retry = RetryPolicy::builder()
        .max_retries(state.config.max_retries)
        .jitter(false)
        .build();
    let ctx = EngineContext::new(
        state.providers.clone(),
        state.kv.clone(),
        state.db.clone(),
        state.queue.clone(),
        reqwest::Client::new(),
        state.health.clone(),
        state.distribution.clone(),
        retry,
    );

    Harness {
        state,
        ctx,
        kv: kv_store,
        queue: queue_impl,
    }
}

/// Run the worker until the queue is empty, promoting every scheduled task
/// immediately (backoff delays collapse to zero wall-clock time).
pub async fn drain(harness: &Harness) {
    let far_future = SystemTime::now() + Duration::from_secs(3600);
    for _ in 0..64 {
        harness.queue.promote_due(far_future).await.unwrap();
        match harness.queue.dequeue(Duration::ZERO).await.unwrap() {
            Some(task) => worker::handle_task(&harness.ctx, task).await,
            None => {
                if harness.queue.scheduled_depth().await.unwrap() == 0 {
                    return;
                }
            }
        }
    }
    panic!("queue did not drain");
}
