//! The durable task queue between admit, dispatch, and send.
//!
//! Work items are serialized [`Task`] envelopes. Two delivery modes:
//! enqueue-now (list push) and enqueue-at (scheduled set, promoted onto the
//! list once due by the worker's promotion loop). All retry backoff in the
//! pipeline is expressed as scheduled delivery - workers never sleep with a
//! task in hand.
//!
//! [`RedisQueue`] is the production implementation; [`MemoryQueue`] backs
//! tests. Tasks carry only serializable data: live handles (trackers,
//! limiters, pools) are reconstructed on the worker side.

mod memory;
mod redis;
mod task;

pub use memory::MemoryQueue;
pub use self::redis::RedisQueue;
pub use task::Task;

use async_trait::async_trait;
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// Name of the ready list.
pub const QUEUE_NAME: &str = "sms_queue";

/// Scheduler-framework dead-letter queue name. Reserved but unused by the
/// runtime; the operator-facing dead-letter list lives in the kv store.
pub const SMS_DEAD_LETTER: &str = "sms_dead_letter";

/// Errors from queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue backend unavailable: {0}")]
    Backend(String),

    #[error("task envelope error: {0}")]
    Envelope(#[from] serde_json::Error),
}

/// Durable work queue with immediate and scheduled delivery.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue for immediate delivery.
    async fn enqueue(&self, task: &Task) -> Result<(), QueueError>;

    /// Enqueue for delivery at (or shortly after) `at`.
    async fn enqueue_at(&self, task: &Task, at: SystemTime) -> Result<(), QueueError>;

    /// Pull the next ready task, waiting up to `timeout`. `None` on timeout.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<Task>, QueueError>;

    /// Move scheduled tasks whose time has come onto the ready list.
    /// Returns how many were promoted.
    async fn promote_due(&self, now: SystemTime) -> Result<u64, QueueError>;

    /// Number of ready tasks.
    async fn depth(&self) -> Result<u64, QueueError>;

    /// Number of scheduled (not yet due or not yet promoted) tasks.
    async fn scheduled_depth(&self) -> Result<u64, QueueError>;
}
