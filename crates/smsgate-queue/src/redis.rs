//! Redis-backed [`TaskQueue`].

use async_trait::async_trait;
use ::redis::aio::ConnectionManager;
use ::redis::AsyncCommands;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::{QueueError, Task, TaskQueue, QUEUE_NAME};

impl From<::redis::RedisError> for QueueError {
    fn from(err: ::redis::RedisError) -> Self {
        QueueError::Backend(err.to_string())
    }
}

/// Durable queue on redis: a list for ready tasks and a score-by-deadline
/// sorted set for scheduled ones.
///
/// Promotion removes a member from the scheduled set before pushing it onto
/// the list, so concurrent promotion loops cannot deliver the same task
/// twice (the `ZREM` only succeeds on one of them).
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    queue_key: String,
    scheduled_key: String,
}

impl RedisQueue {
    /// Connect to the broker at `url`, using the default queue name.
    pub async fn connect(url: &str) -> Result<Self, QueueError> {
        let client = ::redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::from_connection(conn, QUEUE_NAME))
    }

    pub fn from_connection(conn: ConnectionManager, queue_name: &str) -> Self {
        Self {
            conn,
            queue_key: queue_name.to_string(),
            scheduled_key: format!("{queue_name}:scheduled"),
        }
    }

    fn epoch_seconds(at: SystemTime) -> f64 {
        at.duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn enqueue(&self, task: &Task) -> Result<(), QueueError> {
        let payload = serde_json::to_string(task)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.lpush(&self.queue_key, payload).await?;
        debug!(kind = task.kind(), message_id = task.message_id(), "enqueued task");
        Ok(())
    }

    async fn enqueue_at(&self, task: &Task, at: SystemTime) -> Result<(), QueueError> {
        let payload = serde_json::to_string(task)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .zadd(&self.scheduled_key, payload, Self::epoch_seconds(at))
            .await?;
        debug!(
            kind = task.kind(),
            message_id = task.message_id(),
            at = Self::epoch_seconds(at),
            "scheduled task"
        );
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<Task>, QueueError> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn
            .brpop(&self.queue_key, timeout.as_secs_f64())
            .await?;
        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn promote_due(&self, now: SystemTime) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        let due: Vec<String> = conn
            .zrangebyscore_limit(&self.scheduled_key, "-inf", Self::epoch_seconds(now), 0, 100)
            .await?;

        let mut promoted = 0;
        for payload in due {
            let removed: i64 = conn.zrem(&self.scheduled_key, &payload).await?;
            if removed > 0 {
                let _: i64 = conn.lpush(&self.queue_key, &payload).await?;
                promoted += 1;
            }
        }
        if promoted > 0 {
            debug!(promoted, "promoted scheduled tasks");
        }
        Ok(promoted)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(&self.queue_key).await?)
    }

    async fn scheduled_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.conn.clone();
        Ok(conn.zcard(&self.scheduled_key).await?)
    }
}
