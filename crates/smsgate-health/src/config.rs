//! Configuration for health tracking.

/// Window length and failure-rate threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthConfig {
    pub(crate) window_seconds: u64,
    pub(crate) failure_threshold: f64,
}

impl HealthConfig {
    /// Create a new builder.
    pub fn builder() -> HealthConfigBuilder {
        HealthConfigBuilder::default()
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    pub fn failure_threshold(&self) -> f64 {
        self.failure_threshold
    }
}

impl Default for HealthConfig {
    /// 5-minute window, 70 % failure threshold.
    fn default() -> Self {
        Self {
            window_seconds: 300,
            failure_threshold: 0.7,
        }
    }
}

/// Builder for [`HealthConfig`].
#[derive(Default)]
pub struct HealthConfigBuilder {
    window_seconds: Option<u64>,
    failure_threshold: Option<f64>,
}

impl HealthConfigBuilder {
    /// Set the sliding-window length in seconds.
    ///
    /// Default: 300 (5 minutes)
    pub fn window_seconds(mut self, window_seconds: u64) -> Self {
        self.window_seconds = Some(window_seconds);
        self
    }

    /// Set the failure-rate threshold at and above which a provider is
    /// unhealthy.
    ///
    /// Default: 0.7
    pub fn failure_threshold(mut self, failure_threshold: f64) -> Self {
        self.failure_threshold = Some(failure_threshold);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> HealthConfig {
        let default = HealthConfig::default();
        HealthConfig {
            window_seconds: self.window_seconds.unwrap_or(default.window_seconds),
            failure_threshold: self
                .failure_threshold
                .unwrap_or(default.failure_threshold),
        }
    }
}
