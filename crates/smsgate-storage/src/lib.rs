//! Durable accounting for the dispatch pipeline.
//!
//! Four tables, written by the admit path and the worker tasks:
//!
//! - `sms_requests`: one row per admitted request, mutated as it moves
//!   through the lifecycle, never deleted by the core.
//! - `sms_responses`: append-only, one row per upstream attempt (real HTTP
//!   codes, or synthesized 408/500 for timeouts and transport errors).
//! - `sms_retries`: append-only, one row per scheduled retry.
//! - `provider_health`: one summary row per provider, last-writer-wins.
//!
//! Persistence here is for observability, not delivery correctness: callers
//! in the send pipeline log storage errors and keep going.

mod db;
mod models;

pub use db::{Database, RequestFilter};
pub use models::{
    ProviderHealthRecord, RequestStats, RequestStatus, SmsRequest, SmsResponse, SmsRetry,
};

use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("request {0} not found")]
    RequestNotFound(i64),

    #[error("no provider_health row for {0}")]
    ProviderHealthMissing(String),
}
