//! Environment-driven configuration.

use smsgate_core::{ProviderId, Providers};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::str::FromStr;
use tracing::warn;

/// Application settings, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    /// Broker URL for the task queue; usually the same redis instance.
    pub taskiq_broker_url: String,
    pub database_url: String,

    pub host: String,
    pub port: u16,
    pub debug: bool,

    pub provider1_url: String,
    pub provider2_url: String,
    pub provider3_url: String,

    /// Requests per window per provider.
    pub provider_rate_limit: u32,
    /// Total requests per window across the gateway.
    pub total_rate_limit: u32,
    /// Rate-limit window in seconds.
    pub rate_limit_window: u64,
    /// Whether the rate-limit middleware wraps the API routes.
    pub rate_limit_middleware: bool,

    /// Health sliding-window length in seconds.
    pub health_window_duration: u64,
    /// Failure rate at which a provider is unhealthy.
    pub health_failure_threshold: f64,
    /// Minimum seconds between selector status refreshes.
    pub health_check_interval: u64,

    pub max_retries: u32,
    pub retry_base_delay: f64,
    pub retry_max_delay: f64,

    /// Parallel consumers in the worker binary.
    pub worker_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            taskiq_broker_url: "redis://localhost:6379".to_string(),
            database_url: "sqlite://sms_service.db".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            debug: false,
            provider1_url: "http://localhost:8071/api/sms/provider1".to_string(),
            provider2_url: "http://localhost:8072/api/sms/provider2".to_string(),
            provider3_url: "http://localhost:8073/api/sms/provider3".to_string(),
            provider_rate_limit: 50,
            total_rate_limit: 200,
            rate_limit_window: 1,
            rate_limit_middleware: true,
            health_window_duration: 300,
            health_failure_threshold: 0.7,
            health_check_interval: 30,
            max_retries: 5,
            retry_base_delay: 1.0,
            retry_max_delay: 300.0,
            worker_concurrency: 4,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Debug,
{
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, raw, ?default, "unparseable environment value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

impl Config {
    /// Read settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            redis_url: env_or("REDIS_URL", default.redis_url),
            taskiq_broker_url: env_or("TASKIQ_BROKER_URL", default.taskiq_broker_url),
            database_url: env_or("DATABASE_URL", default.database_url),
            host: env_or("HOST", default.host),
            port: env_or("PORT", default.port),
            debug: env_bool("DEBUG", default.debug),
            provider1_url: env_or("PROVIDER1_URL", default.provider1_url),
            provider2_url: env_or("PROVIDER2_URL", default.provider2_url),
            provider3_url: env_or("PROVIDER3_URL", default.provider3_url),
            provider_rate_limit: env_or("PROVIDER_RATE_LIMIT", default.provider_rate_limit),
            total_rate_limit: env_or("TOTAL_RATE_LIMIT", default.total_rate_limit),
            rate_limit_window: env_or("RATE_LIMIT_WINDOW", default.rate_limit_window),
            rate_limit_middleware: env_bool("RATE_LIMIT_MIDDLEWARE", default.rate_limit_middleware),
            health_window_duration: env_or("HEALTH_WINDOW_DURATION", default.health_window_duration),
            health_failure_threshold: env_or(
                "HEALTH_FAILURE_THRESHOLD",
                default.health_failure_threshold,
            ),
            health_check_interval: env_or("HEALTH_CHECK_INTERVAL", default.health_check_interval),
            max_retries: env_or("MAX_RETRIES", default.max_retries),
            retry_base_delay: env_or("RETRY_BASE_DELAY", default.retry_base_delay),
            retry_max_delay: env_or("RETRY_MAX_DELAY", default.retry_max_delay),
            worker_concurrency: env_or("WORKER_CONCURRENCY", default.worker_concurrency),
        }
    }

    /// The closed provider set.
    pub fn providers(&self) -> Providers {
        let mut urls = BTreeMap::new();
        urls.insert(ProviderId::from("provider1"), self.provider1_url.clone());
        urls.insert(ProviderId::from("provider2"), self.provider2_url.clone());
        urls.insert(ProviderId::from("provider3"), self.provider3_url.clone());
        Providers::new(urls)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
