//! Configuration for the distribution selector.

use std::time::Duration;

/// Tunables for [`DistributionService`](crate::DistributionService).
#[derive(Debug, Clone, Copy)]
pub struct DistributionConfig {
    pub(crate) health_check_interval: Duration,
}

impl DistributionConfig {
    /// Create a new builder.
    pub fn builder() -> DistributionConfigBuilder {
        DistributionConfigBuilder::default()
    }

    pub fn health_check_interval(&self) -> Duration {
        self.health_check_interval
    }
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
        }
    }
}

/// Builder for [`DistributionConfig`].
#[derive(Default)]
pub struct DistributionConfigBuilder {
    health_check_interval: Option<Duration>,
}

impl DistributionConfigBuilder {
    /// Minimum interval between provider-status cache refreshes. Zero makes
    /// every selection refresh, which tests rely on.
    ///
    /// Default: 30 seconds
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = Some(interval);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> DistributionConfig {
        let default = DistributionConfig::default();
        DistributionConfig {
            health_check_interval: self
                .health_check_interval
                .unwrap_or(default.health_check_interval),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_interval() {
        let config = DistributionConfig::default();
        assert_eq!(config.health_check_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_builder() {
        let config = DistributionConfig::builder()
            .health_check_interval(Duration::ZERO)
            .build();
        assert_eq!(config.health_check_interval(), Duration::ZERO);
    }
}
