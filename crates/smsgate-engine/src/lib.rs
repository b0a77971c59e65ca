//! The dispatch/send pipeline.
//!
//! Two task handlers drive every admitted request:
//!
//! - [`run_dispatch`]: pick a provider (honoring the request's accumulated
//!   exclusion list), persist the choice, and enqueue a send.
//! - [`run_send`]: one upstream HTTP attempt, then the success or failure
//!   bookkeeping: health samples, response rows, retry scheduling with
//!   exponential backoff, and dead-lettering when retries are exhausted.
//!
//! The sender never sleeps in-process; backoff is expressed as scheduled
//! queue delivery so workers stay available. [`worker`] holds the consume
//! and promotion loops with cooperative shutdown.

mod context;
mod dispatcher;
mod retry;
mod sender;
pub mod worker;

pub use context::EngineContext;
pub use dispatcher::{run_dispatch, DispatchJob, DispatchOutcome};
pub use retry::{DeadLetterEntry, RetryPolicy, RetryPolicyBuilder, DEAD_LETTER_LIST};
pub use sender::{run_send, SendJob, SendOutcome};

use thiserror::Error;

/// Errors that abort a pipeline task (rather than being absorbed into the
/// retry/dead-letter flow).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Queue(#[from] smsgate_queue::QueueError),

    #[error(transparent)]
    Storage(#[from] smsgate_storage::StorageError),
}
