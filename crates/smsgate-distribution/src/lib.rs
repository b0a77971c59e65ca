//! Health- and rate-aware distribution of requests across providers.
//!
//! [`DistributionService::select`] answers one question: given the providers
//! that have already failed for this request, which provider should take the
//! next attempt?
//!
//! Selection runs in two modes:
//!
//! - **Round-robin** while no provider has ever recorded a failure - a cold
//!   or fully healthy cluster gets even distribution over the sorted
//!   candidate list.
//! - **Weighted** from the first recorded failure onward - each candidate is
//!   scored `max(0.1, success_rate)² / (usage + 1)`. Squaring the weight
//!   amplifies quality differences; the usage denominator keeps a
//!   slightly-better provider from monopolizing traffic.
//!
//! Health and rate-limit booleans come from a cache refreshed at most every
//! [`DistributionConfig::health_check_interval`]; stale reads are acceptable.
//! The chosen provider's own window is then confirmed with the mutating
//! rate-limit check, which doubles as the per-provider accounting for the
//! dispatch. If that check refuses (a race against the cache), one second
//! pass runs over the remaining candidates in the same mode.

mod config;
mod service;
mod status;

pub use config::{DistributionConfig, DistributionConfigBuilder};
pub use service::DistributionService;
pub use status::{DistributionSnapshot, DistributionStats, ProviderStatus};
