//! Shared application state and startup wiring.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

use smsgate_core::Providers;
use smsgate_distribution::{DistributionConfig, DistributionService};
use smsgate_health::{HealthConfig, HealthTracker};
use smsgate_kv::{KvStore, RedisStore};
use smsgate_queue::{RedisQueue, TaskQueue};
use smsgate_ratelimiter::{GlobalRateLimiter, RateLimitConfig, RateLimiter};
use smsgate_storage::Database;

use crate::Config;

/// Errors during startup wiring.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Kv(#[from] smsgate_kv::KvError),

    #[error(transparent)]
    Queue(#[from] smsgate_queue::QueueError),

    #[error(transparent)]
    Storage(#[from] smsgate_storage::StorageError),

    #[error("bind error: {0}")]
    Bind(#[from] std::io::Error),
}

/// Everything the handlers need, assembled once in `main` and shared.
pub struct AppState {
    pub config: Config,
    pub providers: Providers,
    pub kv: Arc<dyn KvStore>,
    pub db: Database,
    pub queue: Arc<dyn TaskQueue>,
    pub rate_limiter: Arc<RateLimiter>,
    pub global_limiter: Arc<GlobalRateLimiter>,
    pub health: Arc<HealthTracker>,
    pub distribution: Arc<DistributionService>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire the component graph over the given backends. This is the single
    /// construction point for both binaries and the tests (which pass
    /// in-memory fakes).
    pub fn assemble(
        config: Config,
        kv: Arc<dyn KvStore>,
        db: Database,
        queue: Arc<dyn TaskQueue>,
    ) -> SharedState {
        let providers = config.providers();
        let rate_limiter = Arc::new(RateLimiter::new(
            kv.clone(),
            RateLimitConfig::builder()
                .limit(config.provider_rate_limit)
                .window_seconds(config.rate_limit_window)
                .build(),
        ));
        let global_limiter = Arc::new(GlobalRateLimiter::new(
            kv.clone(),
            RateLimitConfig::builder()
                .limit(config.total_rate_limit)
                .window_seconds(config.rate_limit_window)
                .build(),
        ));
        let health = Arc::new(HealthTracker::new(
            kv.clone(),
            HealthConfig::builder()
                .window_seconds(config.health_window_duration)
                .failure_threshold(config.health_failure_threshold)
                .build(),
        ));
        let distribution = Arc::new(DistributionService::new(
            providers.clone(),
            health.clone(),
            rate_limiter.clone(),
            global_limiter.clone(),
            DistributionConfig::builder()
                .health_check_interval(Duration::from_secs(config.health_check_interval))
                .build(),
        ));

        Arc::new(Self {
            config,
            providers,
            kv,
            db,
            queue,
            rate_limiter,
            global_limiter,
            health,
            distribution,
        })
    }

    /// Connect to redis, the broker, and the database, then assemble.
    ///
    /// Schema bootstrap is best-effort: a failure is logged, not fatal, so a
    /// read-only database cannot keep the gateway from serving.
    pub async fn connect(config: Config) -> Result<SharedState, BootstrapError> {
        let kv: Arc<dyn KvStore> = Arc::new(RedisStore::connect(&config.redis_url).await?);
        let queue: Arc<dyn TaskQueue> =
            Arc::new(RedisQueue::connect(&config.taskiq_broker_url).await?);
        let db = Database::connect(&config.database_url).await?;

        match db.migrate().await {
            Ok(()) => {
                if let Err(err) = db.seed_providers(&config.providers()).await {
                    warn!(%err, "failed to seed provider health rows");
                }
            }
            Err(err) => warn!(%err, "schema migration failed, continuing"),
        }

        Ok(Self::assemble(config, kv, db, queue))
    }
}
