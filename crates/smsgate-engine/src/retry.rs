//! Exponential-backoff retry policy and the dead-letter record.

use serde::{Deserialize, Serialize};

/// KV list the operator inspects for exhausted requests. Authoritative over
/// the scheduler framework's reserved queue name.
pub const DEAD_LETTER_LIST: &str = "dead_letter_queue";

/// One entry on the dead-letter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub request_id: i64,
    pub reason: String,
}

/// Backoff schedule and attempt budget for retries.
///
/// `backoff_delay(n) = min(base · 2ⁿ, max)` seconds, plus up to 25 % additive
/// jitter when enabled.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: f64,
    max_delay: f64,
    jitter: bool,
}

impl RetryPolicy {
    /// Create a new builder.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay in seconds before the given attempt (0-based exponent).
    pub fn backoff_delay(&self, attempt: u32) -> f64 {
        let raw = self.base_delay * 2f64.powi(attempt.min(1024) as i32);
        let capped = raw.min(self.max_delay);
        if self.jitter {
            capped + capped * 0.25 * rand::random::<f64>()
        } else {
            capped
        }
    }
}

impl Default for RetryPolicy {
    /// 5 retries, 1 s base, 300 s cap, jitter on.
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: 1.0,
            max_delay: 300.0,
            jitter: true,
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Default)]
pub struct RetryPolicyBuilder {
    max_retries: Option<u32>,
    base_delay: Option<f64>,
    max_delay: Option<f64>,
    jitter: Option<bool>,
}

impl RetryPolicyBuilder {
    /// Maximum number of retries after the initial attempt.
    ///
    /// Default: 5
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Base delay in seconds for the exponential schedule.
    ///
    /// Default: 1.0
    pub fn base_delay(mut self, base_delay: f64) -> Self {
        self.base_delay = Some(base_delay);
        self
    }

    /// Cap on the computed delay, in seconds.
    ///
    /// Default: 300.0
    pub fn max_delay(mut self, max_delay: f64) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Whether to add random jitter (up to 25 % of the delay).
    ///
    /// Default: true
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Build the policy.
    pub fn build(self) -> RetryPolicy {
        let default = RetryPolicy::default();
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(default.max_retries),
            base_delay: self.base_delay.unwrap_or(default.base_delay),
            max_delay: self.max_delay.unwrap_or(default.max_delay),
            jitter: self.jitter.unwrap_or(default.jitter),
        }
    }
}
