//! The health tracker implementation.

use std::sync::Arc;
use tracing::{debug, error, info};

use smsgate_core::ProviderId;
use smsgate_kv::{parse_count, KvStore};

use crate::{Clock, HealthConfig, HealthError, HealthStatus, SystemClock, WindowCounts};

/// Records per-provider send outcomes and answers "is this provider healthy?".
pub struct HealthTracker {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: HealthConfig,
}

impl HealthTracker {
    pub fn new(store: Arc<dyn KvStore>, config: HealthConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Construct with an explicit time source; tests use [`crate::ManualClock`]
    /// to position reads at exact window offsets.
    pub fn with_clock(store: Arc<dyn KvStore>, config: HealthConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    fn bucket_start(&self, now: f64) -> u64 {
        let window = self.config.window_seconds();
        (now as u64 / window) * window
    }

    fn success_key(&self, provider: &ProviderId, bucket: u64) -> String {
        format!("health:{provider}:success:{bucket}")
    }

    fn failure_key(&self, provider: &ProviderId, bucket: u64) -> String {
        format!("health:{provider}:failure:{bucket}")
    }

    async fn record(&self, key: &str) -> Result<(), HealthError> {
        self.store.incr(key).await?;
        self.store
            .expire(key, self.config.window_seconds())
            .await?;
        Ok(())
    }

    /// Record a successful send for `provider` in the current bucket.
    pub async fn record_success(&self, provider: &ProviderId) -> Result<(), HealthError> {
        let bucket = self.bucket_start(self.clock.now_unix());
        self.record(&self.success_key(provider, bucket)).await?;
        debug!(%provider, bucket, "recorded success");
        Ok(())
    }

    /// Record a failed send for `provider` in the current bucket.
    pub async fn record_failure(&self, provider: &ProviderId) -> Result<(), HealthError> {
        let bucket = self.bucket_start(self.clock.now_unix());
        self.record(&self.failure_key(provider, bucket)).await?;
        debug!(%provider, bucket, "recorded failure");
        Ok(())
    }

    async fn read_count(&self, key: &str) -> Result<i64, HealthError> {
        let value = self.store.get(key).await?;
        Ok(parse_count(value.as_deref()))
    }

    /// Compute the sliding-window health status. KV read errors propagate.
    pub async fn get_health_status(
        &self,
        provider: &ProviderId,
    ) -> Result<HealthStatus, HealthError> {
        let window = self.config.window_seconds();
        let now = self.clock.now_unix();
        let current_bucket = self.bucket_start(now);
        let previous_bucket = current_bucket.saturating_sub(window);

        let current = WindowCounts {
            success: self
                .read_count(&self.success_key(provider, current_bucket))
                .await?,
            failure: self
                .read_count(&self.failure_key(provider, current_bucket))
                .await?,
        };
        let previous = WindowCounts {
            success: self
                .read_count(&self.success_key(provider, previous_bucket))
                .await?,
            failure: self
                .read_count(&self.failure_key(provider, previous_bucket))
                .await?,
        };

        // Weight the previous bucket by the fraction of the window it still
        // covers, flooring to whole requests.
        let fraction_elapsed = (now - current_bucket as f64) / window as f64;
        let previous_weight = (1.0 - fraction_elapsed).max(0.0);
        let weighted_prev_success = (previous.success as f64 * previous_weight) as i64;
        let weighted_prev_failure = (previous.failure as f64 * previous_weight) as i64;

        let success_count = current.success + weighted_prev_success;
        let failure_count = current.failure + weighted_prev_failure;
        let total_requests = success_count + failure_count;
        let failure_rate = if total_requests > 0 {
            failure_count as f64 / total_requests as f64
        } else {
            0.0
        };

        // Strict <: exactly at the threshold counts as unhealthy. Idle
        // providers are never penalized.
        let is_healthy = total_requests == 0 || failure_rate < self.config.failure_threshold();

        Ok(HealthStatus {
            provider_id: provider.clone(),
            is_healthy,
            total_requests,
            success_count,
            failure_count,
            failure_rate,
            current_window: current,
            previous_window: previous,
            window_expires_at: current_bucket + window,
            threshold: self.config.failure_threshold(),
            window_duration_seconds: window,
            error: None,
        })
    }

    /// Like [`get_health_status`](Self::get_health_status) but mapping kv
    /// failures to the unknown-is-healthy default, so a store outage cannot
    /// block all traffic.
    pub async fn health_status_or_default(&self, provider: &ProviderId) -> HealthStatus {
        match self.get_health_status(provider).await {
            Ok(status) => status,
            Err(err) => {
                error!(%provider, %err, "health status unavailable, defaulting to healthy");
                HealthStatus::unknown_healthy(
                    provider.clone(),
                    self.config.failure_threshold(),
                    self.config.window_seconds(),
                    err.to_string(),
                )
            }
        }
    }

    /// Quick boolean check, defaulting to healthy on error.
    pub async fn is_healthy(&self, provider: &ProviderId) -> bool {
        self.health_status_or_default(provider).await.is_healthy
    }

    /// Drop the current and previous buckets for `provider`.
    pub async fn reset(&self, provider: &ProviderId) -> Result<(), HealthError> {
        let window = self.config.window_seconds();
        let current_bucket = self.bucket_start(self.clock.now_unix());
        let previous_bucket = current_bucket.saturating_sub(window);
        let keys = vec![
            self.success_key(provider, current_bucket),
            self.failure_key(provider, current_bucket),
            self.success_key(provider, previous_bucket),
            self.failure_key(provider, previous_bucket),
        ];
        self.store.del(&keys).await?;
        info!(%provider, "reset health window");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualClock;
    use smsgate_kv::{MemoryStore, UnavailableStore};

    const WINDOW: u64 = 300;

    fn tracker_at(now: f64) -> (HealthTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        let tracker = HealthTracker::with_clock(
            Arc::new(MemoryStore::new()),
            HealthConfig::builder().window_seconds(WINDOW).build(),
            clock.clone(),
        );
        (tracker, clock)
    }

    fn provider() -> ProviderId {
        ProviderId::from("provider2")
    }

    async fn record_many(tracker: &HealthTracker, provider: &ProviderId, ok: u32, fail: u32) {
        for _ in 0..ok {
            tracker.record_success(provider).await.unwrap();
        }
        for _ in 0..fail {
            tracker.record_failure(provider).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_idle_provider_is_healthy() {
        let (tracker, _) = tracker_at(3000.0);
        let status = tracker.get_health_status(&provider()).await.unwrap();
        assert!(status.is_healthy);
        assert_eq!(status.total_requests, 0);
        assert_eq!(status.failure_rate, 0.0);
    }

    #[tokio::test]
    async fn test_counts_accumulate_in_current_bucket() {
        let (tracker, _) = tracker_at(3000.0);
        let p = provider();
        record_many(&tracker, &p, 3, 1).await;

        let status = tracker.get_health_status(&p).await.unwrap();
        assert_eq!(status.current_window.success, 3);
        assert_eq!(status.current_window.failure, 1);
        assert_eq!(status.total_requests, 4);
        assert_eq!(status.failure_rate, 0.25);
        assert!(status.is_healthy);
    }

    #[tokio::test]
    async fn test_exactly_at_threshold_is_unhealthy() {
        // 7 failures out of 10 is a 0.7 rate; strict < means unhealthy.
        let (tracker, _) = tracker_at(3000.0);
        let p = provider();
        record_many(&tracker, &p, 3, 7).await;

        let status = tracker.get_health_status(&p).await.unwrap();
        assert_eq!(status.failure_rate, 0.7);
        assert!(!status.is_healthy);
    }

    #[tokio::test]
    async fn test_just_under_threshold_is_healthy() {
        let (tracker, _) = tracker_at(3000.0);
        let p = provider();
        record_many(&tracker, &p, 4, 6).await;

        let status = tracker.get_health_status(&p).await.unwrap();
        assert!(status.failure_rate < 0.7);
        assert!(status.is_healthy);
    }

    #[tokio::test]
    async fn test_previous_bucket_weighting_at_boundary() {
        // Previous bucket: 10 successes. 20 s into the next bucket, the
        // previous window keeps floor(10 * (1 - 20/300)) = 9 of them.
        let (tracker, clock) = tracker_at(3000.0);
        let p = provider();
        record_many(&tracker, &p, 10, 0).await;

        clock.set(3300.0 + 20.0);
        tracker.record_failure(&p).await.unwrap();

        let status = tracker.get_health_status(&p).await.unwrap();
        assert_eq!(status.success_count, 9);
        assert_eq!(status.failure_count, 1);
        assert_eq!(status.total_requests, 10);
        assert!((status.failure_rate - 0.1).abs() < 1e-9);
        assert!(status.is_healthy);
    }

    #[tokio::test]
    async fn test_previous_bucket_fades_out_over_the_window() {
        let (tracker, clock) = tracker_at(3000.0);
        let p = provider();
        record_many(&tracker, &p, 8, 0).await;

        // 90 % through the next bucket, only floor(8 * 0.1) = 0 remain.
        clock.set(3300.0 + 270.0);
        let status = tracker.get_health_status(&p).await.unwrap();
        assert_eq!(status.success_count, 0);
        assert_eq!(status.total_requests, 0);
        assert!(status.is_healthy);
    }

    #[tokio::test]
    async fn test_provider_flaps_unhealthy_then_recovers() {
        let (tracker, _) = tracker_at(3000.0);
        let p = provider();

        record_many(&tracker, &p, 2, 8).await;
        assert!(!tracker.is_healthy(&p).await);

        // Sustained successes in the same bucket pull the rate back down:
        // 12 successes / 8 failures = 0.4.
        record_many(&tracker, &p, 10, 0).await;
        let status = tracker.get_health_status(&p).await.unwrap();
        assert!(status.failure_rate < 0.7);
        assert!(status.is_healthy);
    }

    #[tokio::test]
    async fn test_reset_clears_both_buckets() {
        let (tracker, _) = tracker_at(3000.0);
        let p = provider();
        record_many(&tracker, &p, 2, 5).await;

        tracker.reset(&p).await.unwrap();
        let status = tracker.get_health_status(&p).await.unwrap();
        assert_eq!(status.total_requests, 0);
        assert!(status.is_healthy);
    }

    #[tokio::test]
    async fn test_recording_surfaces_kv_errors() {
        let tracker = HealthTracker::new(Arc::new(UnavailableStore::new()), HealthConfig::default());
        assert!(tracker.record_success(&provider()).await.is_err());
        assert!(tracker.record_failure(&provider()).await.is_err());
    }

    #[tokio::test]
    async fn test_status_defaults_to_healthy_on_kv_error() {
        let tracker = HealthTracker::new(Arc::new(UnavailableStore::new()), HealthConfig::default());
        assert!(tracker.get_health_status(&provider()).await.is_err());

        let status = tracker.health_status_or_default(&provider()).await;
        assert!(status.is_healthy);
        assert!(status.error.is_some());
        assert!(tracker.is_healthy(&provider()).await);
    }
}
