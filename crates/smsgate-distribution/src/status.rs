//! Selector-side provider status and distribution statistics.

use serde::Serialize;
use smsgate_core::ProviderId;
use std::collections::BTreeMap;

/// Cached view of one provider, refreshed on the health-check interval.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub provider_id: ProviderId,
    pub is_healthy: bool,
    pub is_rate_limited: bool,
    /// Last observed rate-limit window count.
    pub current_load: i64,
}

impl ProviderStatus {
    pub(crate) fn assume_healthy(provider_id: ProviderId) -> Self {
        Self {
            provider_id,
            is_healthy: true,
            is_rate_limited: false,
            current_load: 0,
        }
    }
}

/// Counters the selector keeps about its own decisions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DistributionStats {
    pub total_requests: u64,
    pub healthy_providers: usize,
    pub unhealthy_providers: usize,
    pub requests_per_provider: BTreeMap<ProviderId, u64>,
    pub round_robin_index: usize,
}

/// Snapshot returned to the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DistributionSnapshot {
    #[serde(flatten)]
    pub stats: DistributionStats,
    pub provider_usage_count: BTreeMap<ProviderId, u64>,
    pub provider_status: BTreeMap<ProviderId, ProviderStatus>,
}
