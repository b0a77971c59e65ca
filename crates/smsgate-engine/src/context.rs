//! Shared handles for the pipeline tasks.

use std::sync::Arc;
use std::time::Duration;

use smsgate_core::Providers;
use smsgate_distribution::DistributionService;
use smsgate_health::HealthTracker;
use smsgate_kv::KvStore;
use smsgate_queue::TaskQueue;
use smsgate_storage::Database;

use crate::RetryPolicy;

/// Hard timeout on each upstream POST.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a worker task needs, built once in `main` and shared by
/// reference. Tasks on the queue carry only data; the live handles are
/// reconstructed here on the worker side.
pub struct EngineContext {
    pub providers: Providers,
    pub kv: Arc<dyn KvStore>,
    pub db: Database,
    pub queue: Arc<dyn TaskQueue>,
    pub http: reqwest::Client,
    pub health: Arc<HealthTracker>,
    pub distribution: Arc<DistributionService>,
    pub retry: RetryPolicy,
    pub send_timeout: Duration,
}

impl EngineContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        providers: Providers,
        kv: Arc<dyn KvStore>,
        db: Database,
        queue: Arc<dyn TaskQueue>,
        http: reqwest::Client,
        health: Arc<HealthTracker>,
        distribution: Arc<DistributionService>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            providers,
            kv,
            db,
            queue,
            http,
            health,
            distribution,
            retry,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}
