//! Fixed-window rate limiting backed by the kv store.
//!
//! One algorithm, two scopes: a per-provider limiter (key
//! `rate_limit:<provider>`) and a global limiter (key `global_rate_limit`).
//! The counter key carries no timestamp; the TTL set on the window's first
//! increment *is* the window, so concurrent callers always collide on the
//! same counter.
//!
//! Rate limiting is a throttle, not an authorization boundary: when the kv
//! store is unreachable, [`RateLimiter::is_allowed`] fails open and reports
//! `(true, 0)` rather than shedding all traffic.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use smsgate_core::ProviderId;
//! use smsgate_kv::MemoryStore;
//! use smsgate_ratelimiter::{RateLimitConfig, RateLimiter};
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(
//!     Arc::new(MemoryStore::new()),
//!     RateLimitConfig::builder().limit(2).window_seconds(1).build(),
//! );
//!
//! let provider = ProviderId::from("provider1");
//! assert_eq!(limiter.is_allowed(&provider).await, (true, 1));
//! assert_eq!(limiter.is_allowed(&provider).await, (true, 2));
//! assert_eq!(limiter.is_allowed(&provider).await, (false, 3));
//! # }
//! ```

mod config;
mod limiter;

pub use config::{RateLimitConfig, RateLimitConfigBuilder};
pub use limiter::{GlobalRateLimitStats, GlobalRateLimiter, RateLimitStats, RateLimiter};

/// Key prefix for per-provider counters.
pub const PROVIDER_KEY_PREFIX: &str = "rate_limit";

/// Key for the global counter.
pub const GLOBAL_KEY: &str = "global_rate_limit";
