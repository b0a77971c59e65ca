//! Configuration for the fixed-window limiters.

/// Limit and window for one limiter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub(crate) limit: u32,
    pub(crate) window_seconds: u64,
}

impl RateLimitConfig {
    /// Create a new builder.
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::default()
    }

    /// The per-provider default: 50 requests per 1-second window.
    pub fn provider_default() -> Self {
        Self {
            limit: 50,
            window_seconds: 1,
        }
    }

    /// The global default: 200 requests per 1-second window.
    pub fn global_default() -> Self {
        Self {
            limit: 200,
            window_seconds: 1,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::provider_default()
    }
}

/// Builder for [`RateLimitConfig`].
#[derive(Default)]
pub struct RateLimitConfigBuilder {
    limit: Option<u32>,
    window_seconds: Option<u64>,
}

impl RateLimitConfigBuilder {
    /// Set the maximum number of requests per window.
    ///
    /// Default: 50
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the window length in seconds.
    ///
    /// Default: 1
    pub fn window_seconds(mut self, window_seconds: u64) -> Self {
        self.window_seconds = Some(window_seconds);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> RateLimitConfig {
        let default = RateLimitConfig::default();
        RateLimitConfig {
            limit: self.limit.unwrap_or(default.limit),
            window_seconds: self.window_seconds.unwrap_or(default.window_seconds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RateLimitConfig::default();
        assert_eq!(config.limit(), 50);
        assert_eq!(config.window_seconds(), 1);

        let global = RateLimitConfig::global_default();
        assert_eq!(global.limit(), 200);
    }

    #[test]
    fn test_builder_partial() {
        let config = RateLimitConfig::builder().limit(10).build();
        assert_eq!(config.limit(), 10);
        assert_eq!(config.window_seconds(), 1); // Default
    }
}
