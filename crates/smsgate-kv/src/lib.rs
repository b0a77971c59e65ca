//! The key/value store boundary.
//!
//! Rate limiting, health sampling, and the dead-letter list are all built on
//! a handful of primitive operations: atomic integer increment, TTL expiry,
//! point reads, deletes, and list pushes. [`KvStore`] is the seam that keeps
//! those consumers testable without a running redis:
//!
//! - [`RedisStore`]: the production implementation over a shared
//!   `ConnectionManager`.
//! - [`MemoryStore`]: a TTL-aware in-process fake for tests.
//! - [`UnavailableStore`]: a store whose every call fails, for exercising
//!   fail-open and surfaced-error paths.

mod error;
mod memory;
mod redis;

use async_trait::async_trait;

pub use error::KvError;
pub use memory::{MemoryStore, UnavailableStore};
pub use self::redis::RedisStore;

/// Minimal key/value operations required by the dispatch core.
///
/// Counters are stringly typed on the wire (redis semantics); [`parse_count`]
/// is the shared lenient decoder for reads.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Atomically increment the integer at `key`, creating it at 1.
    async fn incr(&self, key: &str) -> Result<i64, KvError>;

    /// Set a TTL in seconds. Returns whether the key existed.
    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, KvError>;

    /// Point read. `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Delete the given keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> Result<u64, KvError>;

    /// Push a value onto the head of the list at `key`; returns the new length.
    async fn lpush(&self, key: &str, value: &str) -> Result<u64, KvError>;

    /// Read a range of the list at `key` (redis `LRANGE` semantics; `-1` is
    /// the last element).
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>, KvError>;

    /// Length of the list at `key` (0 when absent).
    async fn llen(&self, key: &str) -> Result<u64, KvError>;
}

/// Decode a counter read leniently: absent, empty, or non-numeric values all
/// count as zero.
pub fn parse_count(value: Option<&str>) -> i64 {
    match value {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::debug!(value = raw, "non-integer counter value, treating as 0");
            0
        }),
        None => 0,
    }
}
