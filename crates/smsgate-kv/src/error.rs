use thiserror::Error;

/// Errors surfaced by a [`KvStore`](crate::KvStore) implementation.
#[derive(Debug, Clone, Error)]
pub enum KvError {
    /// The backend could not be reached or refused the operation.
    #[error("kv store unavailable: {0}")]
    Unavailable(String),
}

impl From<redis::RedisError> for KvError {
    fn from(err: redis::RedisError) -> Self {
        KvError::Unavailable(err.to_string())
    }
}
