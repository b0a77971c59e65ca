//! The per-provider and global limiter implementations.

use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};

use smsgate_core::ProviderId;
use smsgate_kv::{parse_count, KvError, KvStore};

use crate::{RateLimitConfig, GLOBAL_KEY, PROVIDER_KEY_PREFIX};

/// A snapshot of one provider's window, for the read endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    pub provider_id: ProviderId,
    pub current_count: i64,
    pub rate_limit: u32,
    pub remaining: i64,
    pub is_limited: bool,
    pub window_seconds: u64,
    pub reset_time: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A snapshot of the global window.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalRateLimitStats {
    pub current_count: i64,
    pub rate_limit: u32,
    pub remaining: i64,
    pub is_limited: bool,
    pub window_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// INCR the counter at `key`, arming the TTL on the window's first hit.
async fn incr_window(store: &dyn KvStore, key: &str, window_seconds: u64) -> Result<i64, KvError> {
    let count = store.incr(key).await?;
    if count == 1 {
        if let Err(err) = store.expire(key, window_seconds).await {
            // The counter exists without a TTL now; the next window's first
            // increment will re-arm it. Worth a warning, not a failure.
            warn!(key, %err, "failed to arm rate-limit window expiry");
        }
    }
    Ok(count)
}

/// Per-provider fixed-window rate limiter.
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn limit(&self) -> u32 {
        self.config.limit()
    }

    pub fn window_seconds(&self) -> u64 {
        self.config.window_seconds()
    }

    fn key(provider: &ProviderId) -> String {
        format!("{PROVIDER_KEY_PREFIX}:{provider}")
    }

    /// Atomically count this request against `provider`'s window.
    ///
    /// Returns `(allowed, current_count)`. Fails open: a kv failure yields
    /// `(true, 0)` so a store outage degrades fairness, not delivery.
    pub async fn is_allowed(&self, provider: &ProviderId) -> (bool, i64) {
        let key = Self::key(provider);
        match incr_window(self.store.as_ref(), &key, self.config.window_seconds()).await {
            Ok(count) => {
                let allowed = count <= i64::from(self.config.limit());
                debug!(%provider, count, limit = self.config.limit(), allowed, "rate limit check");
                (allowed, count)
            }
            Err(err) => {
                error!(%provider, %err, "kv error in rate limiter");
                warn!(%provider, "rate limiting bypassed due to kv error");
                (true, 0)
            }
        }
    }

    /// Current window count without incrementing. Absent key reads as 0.
    pub async fn current_count(&self, provider: &ProviderId) -> Result<i64, KvError> {
        let value = self.store.get(&Self::key(provider)).await?;
        Ok(parse_count(value.as_deref()))
    }

    /// Delete the provider's counter, opening a fresh window.
    pub async fn reset(&self, provider: &ProviderId) -> Result<(), KvError> {
        self.store.del(&[Self::key(provider)]).await?;
        Ok(())
    }

    /// Non-mutating stats snapshot for the read endpoints. KV errors are
    /// folded into the `error` field rather than propagated.
    pub async fn stats(&self, provider: &ProviderId) -> RateLimitStats {
        match self.current_count(provider).await {
            Ok(current_count) => RateLimitStats {
                provider_id: provider.clone(),
                current_count,
                rate_limit: self.config.limit(),
                remaining: (i64::from(self.config.limit()) - current_count).max(0),
                is_limited: current_count >= i64::from(self.config.limit()),
                window_seconds: self.config.window_seconds(),
                reset_time: now_epoch() + self.config.window_seconds() as f64,
                error: None,
            },
            Err(err) => {
                error!(%provider, %err, "failed to read rate limit stats");
                RateLimitStats {
                    provider_id: provider.clone(),
                    current_count: 0,
                    rate_limit: self.config.limit(),
                    remaining: i64::from(self.config.limit()),
                    is_limited: false,
                    window_seconds: self.config.window_seconds(),
                    reset_time: now_epoch() + self.config.window_seconds() as f64,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

/// Global fixed-window rate limiter for overall throughput.
pub struct GlobalRateLimiter {
    store: Arc<dyn KvStore>,
    config: RateLimitConfig,
}

impl GlobalRateLimiter {
    pub fn new(store: Arc<dyn KvStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    pub fn limit(&self) -> u32 {
        self.config.limit()
    }

    pub fn window_seconds(&self) -> u64 {
        self.config.window_seconds()
    }

    /// Count this request against the global window. Fails open like the
    /// per-provider check.
    pub async fn is_allowed(&self) -> (bool, i64) {
        match incr_window(self.store.as_ref(), GLOBAL_KEY, self.config.window_seconds()).await {
            Ok(count) => (count <= i64::from(self.config.limit()), count),
            Err(err) => {
                error!(%err, "kv error in global rate limiter");
                warn!("global rate limiting bypassed due to kv error");
                (true, 0)
            }
        }
    }

    /// Current global count without incrementing.
    ///
    /// Unlike the stats path this propagates kv errors: the selector treats
    /// an unreadable global counter as a reason to shed.
    pub async fn current_count(&self) -> Result<i64, KvError> {
        let value = self.store.get(GLOBAL_KEY).await?;
        Ok(parse_count(value.as_deref()))
    }

    /// Delete the global counter.
    pub async fn reset(&self) -> Result<(), KvError> {
        self.store.del(&[GLOBAL_KEY.to_string()]).await?;
        Ok(())
    }

    /// Stats snapshot with kv errors folded into the `error` field.
    pub async fn stats(&self) -> GlobalRateLimitStats {
        match self.current_count().await {
            Ok(current_count) => GlobalRateLimitStats {
                current_count,
                rate_limit: self.config.limit(),
                remaining: (i64::from(self.config.limit()) - current_count).max(0),
                is_limited: current_count >= i64::from(self.config.limit()),
                window_seconds: self.config.window_seconds(),
                error: None,
            },
            Err(err) => GlobalRateLimitStats {
                current_count: 0,
                rate_limit: self.config.limit(),
                remaining: i64::from(self.config.limit()),
                is_limited: false,
                window_seconds: self.config.window_seconds(),
                error: Some(err.to_string()),
            },
        }
    }
}
