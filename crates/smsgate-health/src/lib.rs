//! Sliding-window provider health tracking.
//!
//! Every send outcome lands in one of two counters per provider per
//! epoch-aligned time bucket:
//!
//! ```text
//! health:<provider>:success:<bucket_start>
//! health:<provider>:failure:<bucket_start>
//! ```
//!
//! each expiring one window after its last write. Health is computed over the
//! current bucket plus the previous bucket weighted by the fraction of the
//! window it still covers, floored to whole requests. A raw per-bucket
//! counter would jump discontinuously at bucket boundaries; the weighting
//! gives a smooth estimate without storing per-event timestamps.
//!
//! A provider is unhealthy when its failure rate reaches the threshold
//! (strictly-less-than is healthy; exactly at the threshold is not), and an
//! idle provider is always healthy.
//!
//! Health accounting is less forgiving than rate limiting: recording errors
//! are surfaced to the caller instead of swallowed, because dispatcher
//! decisions depend on this signal.

mod clock;
mod config;
mod status;
mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{HealthConfig, HealthConfigBuilder};
pub use status::{HealthStatus, WindowCounts};
pub use tracker::HealthTracker;

use thiserror::Error;

/// Errors from the health tracker.
#[derive(Debug, Clone, Error)]
pub enum HealthError {
    #[error("health tracking unavailable: {0}")]
    Kv(#[from] smsgate_kv::KvError),
}
