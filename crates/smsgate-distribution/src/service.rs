//! The distribution selector.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use smsgate_core::{ProviderId, Providers};
use smsgate_health::HealthTracker;
use smsgate_kv::KvError;
use smsgate_ratelimiter::{GlobalRateLimiter, RateLimiter};

use crate::{DistributionConfig, DistributionSnapshot, DistributionStats, ProviderStatus};

enum RefreshError {
    Health(smsgate_health::HealthError),
    RateLimit(KvError),
}

struct SelectorState {
    status: BTreeMap<ProviderId, ProviderStatus>,
    usage: BTreeMap<ProviderId, u64>,
    stats: DistributionStats,
    last_refresh: Option<Instant>,
}

/// Chooses a provider for each dispatch attempt.
///
/// One instance lives per worker process; its usage counters and round-robin
/// index are process-local caches, not the source of truth for fairness.
pub struct DistributionService {
    providers: Providers,
    health: Arc<HealthTracker>,
    limiter: Arc<RateLimiter>,
    global: Arc<GlobalRateLimiter>,
    config: DistributionConfig,
    inner: Mutex<SelectorState>,
}

impl DistributionService {
    pub fn new(
        providers: Providers,
        health: Arc<HealthTracker>,
        limiter: Arc<RateLimiter>,
        global: Arc<GlobalRateLimiter>,
        config: DistributionConfig,
    ) -> Self {
        let status = providers
            .ids()
            .map(|id| (id.clone(), ProviderStatus::assume_healthy(id.clone())))
            .collect();
        let stats = DistributionStats {
            requests_per_provider: providers.ids().map(|id| (id.clone(), 0)).collect(),
            ..DistributionStats::default()
        };
        Self {
            providers,
            health,
            limiter,
            global,
            config,
            inner: Mutex::new(SelectorState {
                status,
                usage: BTreeMap::new(),
                stats,
                last_refresh: None,
            }),
        }
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    /// Select a provider for the next attempt, skipping everything in
    /// `excluded` (the providers that already failed for this request, in
    /// failure order). Returns `(provider_id, url)` or `None` when nothing
    /// can take the request.
    pub async fn select(&self, excluded: &[ProviderId]) -> Option<(ProviderId, String)> {
        let mut state = self.inner.lock().await;
        state.stats.total_requests += 1;

        if let Err(err) = self.refresh_status(&mut state).await {
            match err {
                RefreshError::Health(err) => {
                    // Degraded default: better one known provider than none.
                    error!(%err, "health refresh failed, falling back to first configured provider");
                    let (id, url) = self.providers.first()?;
                    let id = id.clone();
                    let url = url.to_string();
                    Self::count_selection(&mut state, &id);
                    return Some((id, url));
                }
                RefreshError::RateLimit(err) => {
                    error!(%err, "rate-limit status unavailable, shedding request");
                    return None;
                }
            }
        }

        match self.global.current_count().await {
            Ok(count) if count >= i64::from(self.global.limit()) => {
                warn!(count, limit = self.global.limit(), "global rate limit reached");
                return None;
            }
            Ok(_) => {}
            Err(err) => {
                error!(%err, "global rate limit unreadable, shedding request");
                return None;
            }
        }

        let candidates = Self::candidates(&state, excluded);
        if candidates.is_empty() {
            warn!("no healthy providers available");
            return None;
        }

        let weighted = self.any_recorded_failures().await;
        let pick = if weighted {
            self.weighted_pick(&state, &candidates).await?
        } else {
            Self::round_robin_pick(&mut state, &candidates)
        };

        // Confirm the pick against the live window. This mutating check is
        // also the per-provider rate accounting for the dispatch.
        let (allowed, count) = self.limiter.is_allowed(&pick).await;
        let chosen = if allowed {
            pick
        } else {
            Self::mark_rate_limited(&mut state, &pick, count);
            warn!(provider = %pick, "provider rate limited after selection, trying alternatives");
            let rest: Vec<ProviderId> = candidates.into_iter().filter(|p| p != &pick).collect();
            if rest.is_empty() {
                return None;
            }
            let alternative = if weighted {
                self.weighted_pick(&state, &rest).await?
            } else {
                Self::round_robin_pick(&mut state, &rest)
            };
            let (alt_allowed, alt_count) = self.limiter.is_allowed(&alternative).await;
            if !alt_allowed {
                Self::mark_rate_limited(&mut state, &alternative, alt_count);
                warn!("no non-rate-limited provider available");
                return None;
            }
            info!(provider = %alternative, "selected alternative provider after rate-limit race");
            alternative
        };

        Self::count_selection(&mut state, &chosen);
        let url = self.providers.url(&chosen)?.to_string();
        info!(
            provider = %chosen,
            mode = if weighted { "weighted" } else { "round-robin" },
            usage = state.usage.get(&chosen).copied().unwrap_or(0),
            "selected provider"
        );
        Some((chosen, url))
    }

    /// Current stats and cached provider status.
    pub async fn snapshot(&self) -> DistributionSnapshot {
        let state = self.inner.lock().await;
        DistributionSnapshot {
            stats: state.stats.clone(),
            provider_usage_count: state.usage.clone(),
            provider_status: state.status.clone(),
        }
    }

    /// Zero every distribution counter; cached health booleans survive.
    pub async fn reset_stats(&self) {
        let mut state = self.inner.lock().await;
        state.stats = DistributionStats {
            requests_per_provider: self.providers.ids().map(|id| (id.clone(), 0)).collect(),
            ..DistributionStats::default()
        };
        state.usage.clear();
    }

    async fn refresh_status(&self, state: &mut SelectorState) -> Result<(), RefreshError> {
        let due = state
            .last_refresh
            .is_none_or(|at| at.elapsed() >= self.config.health_check_interval());
        if !due {
            return Ok(());
        }
        state.last_refresh = Some(Instant::now());

        for id in self.providers.ids() {
            let health = self
                .health
                .get_health_status(id)
                .await
                .map_err(RefreshError::Health)?;
            let count = self
                .limiter
                .current_count(id)
                .await
                .map_err(RefreshError::RateLimit)?;

            let entry = state
                .status
                .entry(id.clone())
                .or_insert_with(|| ProviderStatus::assume_healthy(id.clone()));
            entry.is_healthy = health.is_healthy;
            entry.is_rate_limited = count >= i64::from(self.limiter.limit());
            entry.current_load = count;

            if health.is_healthy {
                debug!(provider = %id, "provider is healthy");
            } else {
                warn!(provider = %id, failure_rate = health.failure_rate, "provider is unhealthy");
            }
        }

        state.stats.healthy_providers = state.status.values().filter(|s| s.is_healthy).count();
        state.stats.unhealthy_providers = state.status.len() - state.stats.healthy_providers;
        Ok(())
    }

    /// Healthy, non-rate-limited, non-excluded providers in sorted order.
    fn candidates(state: &SelectorState, excluded: &[ProviderId]) -> Vec<ProviderId> {
        state
            .status
            .values()
            .filter(|s| s.is_healthy && !s.is_rate_limited && !excluded.contains(&s.provider_id))
            .map(|s| s.provider_id.clone())
            .collect()
    }

    /// Weighted mode activates on the first failure recorded anywhere in the
    /// provider set, not just among current candidates.
    async fn any_recorded_failures(&self) -> bool {
        for id in self.providers.ids() {
            let status = self.health.health_status_or_default(id).await;
            if status.failure_count > 0 || status.failure_rate > 0.0 {
                return true;
            }
        }
        false
    }

    fn round_robin_pick(state: &mut SelectorState, candidates: &[ProviderId]) -> ProviderId {
        let index = state.stats.round_robin_index % candidates.len();
        state.stats.round_robin_index += 1;
        candidates[index].clone()
    }

    async fn weighted_pick(
        &self,
        state: &SelectorState,
        candidates: &[ProviderId],
    ) -> Option<ProviderId> {
        let mut best: Option<(ProviderId, f64)> = None;
        for id in candidates {
            let status = self.health.health_status_or_default(id).await;
            let weight = status.success_rate().max(0.1);
            let usage = state.usage.get(id).copied().unwrap_or(0);
            let score = (weight * weight) / (usage as f64 + 1.0);
            if best.as_ref().is_none_or(|(_, top)| score > *top) {
                best = Some((id.clone(), score));
            }
        }
        best.map(|(id, _)| id)
    }

    fn mark_rate_limited(state: &mut SelectorState, provider: &ProviderId, count: i64) {
        if let Some(status) = state.status.get_mut(provider) {
            status.is_rate_limited = true;
            status.current_load = count;
        }
    }

    fn count_selection(state: &mut SelectorState, provider: &ProviderId) {
        *state.usage.entry(provider.clone()).or_default() += 1;
        *state
            .stats
            .requests_per_provider
            .entry(provider.clone())
            .or_default() += 1;
    }
}
