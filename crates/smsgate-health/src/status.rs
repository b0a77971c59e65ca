//! Typed health status records.

use serde::Serialize;
use smsgate_core::ProviderId;

/// Raw counters for one bucket.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct WindowCounts {
    pub success: i64,
    pub failure: i64,
}

/// Computed health of one provider over the sliding window.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub provider_id: ProviderId,
    pub is_healthy: bool,
    pub total_requests: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub failure_rate: f64,
    pub current_window: WindowCounts,
    pub previous_window: WindowCounts,
    /// When the current bucket's counters expire (unix seconds).
    pub window_expires_at: u64,
    pub threshold: f64,
    pub window_duration_seconds: u64,
    /// Set when the status could not be computed and defaulted to healthy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthStatus {
    /// The unknown-is-healthy default used when the kv store cannot be read:
    /// zero observed traffic, healthy, with the failure recorded in `error`.
    pub(crate) fn unknown_healthy(
        provider_id: ProviderId,
        threshold: f64,
        window_duration_seconds: u64,
        error: String,
    ) -> Self {
        Self {
            provider_id,
            is_healthy: true,
            total_requests: 0,
            success_count: 0,
            failure_count: 0,
            failure_rate: 0.0,
            current_window: WindowCounts::default(),
            previous_window: WindowCounts::default(),
            window_expires_at: 0,
            threshold,
            window_duration_seconds,
            error: Some(error),
        }
    }

    pub fn success_rate(&self) -> f64 {
        1.0 - self.failure_rate
    }
}
