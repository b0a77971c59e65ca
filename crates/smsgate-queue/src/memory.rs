//! In-process queue for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use crate::{QueueError, Task, TaskQueue};

#[derive(Default)]
struct Inner {
    ready: VecDeque<Task>,
    scheduled: Vec<(SystemTime, Task)>,
}

/// Non-blocking in-memory [`TaskQueue`].
///
/// `dequeue` returns immediately (the timeout is ignored); scheduled tasks
/// sit until [`promote_due`](TaskQueue::promote_due) is called with a time at
/// or past their deadline, which lets tests drive the clock explicitly.
#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deadlines currently scheduled, for assertions on backoff.
    pub fn scheduled_deadlines(&self) -> Vec<SystemTime> {
        let inner = self.inner.lock().expect("memory queue lock poisoned");
        inner.scheduled.iter().map(|(at, _)| *at).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory queue lock poisoned")
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn enqueue(&self, task: &Task) -> Result<(), QueueError> {
        self.lock().ready.push_back(task.clone());
        Ok(())
    }

    async fn enqueue_at(&self, task: &Task, at: SystemTime) -> Result<(), QueueError> {
        self.lock().scheduled.push((at, task.clone()));
        Ok(())
    }

    async fn dequeue(&self, _timeout: Duration) -> Result<Option<Task>, QueueError> {
        Ok(self.lock().ready.pop_front())
    }

    async fn promote_due(&self, now: SystemTime) -> Result<u64, QueueError> {
        let mut inner = self.lock();
        let mut promoted = 0;
        let mut remaining = Vec::with_capacity(inner.scheduled.len());
        let drained: Vec<(SystemTime, Task)> = inner.scheduled.drain(..).collect();
        for (at, task) in drained {
            if at <= now {
                inner.ready.push_back(task);
                promoted += 1;
            } else {
                remaining.push((at, task));
            }
        }
        inner.scheduled = remaining;
        Ok(promoted)
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(self.lock().ready.len() as u64)
    }

    async fn scheduled_depth(&self) -> Result<u64, QueueError> {
        Ok(self.lock().scheduled.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smsgate_core::ProviderId;

    fn dispatch(message_id: &str) -> Task {
        Task::Dispatch {
            message_id: message_id.to_string(),
            request_id: 1,
            phone: "01921317475".to_string(),
            text: "Hello".to_string(),
            excluded: Vec::<ProviderId>::new(),
            attempt: 0,
        }
    }

    #[tokio::test]
    async fn test_fifo_delivery() {
        let queue = MemoryQueue::new();
        queue.enqueue(&dispatch("a")).await.unwrap();
        queue.enqueue(&dispatch("b")).await.unwrap();

        let first = queue.dequeue(Duration::ZERO).await.unwrap().unwrap();
        let second = queue.dequeue(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(first.message_id(), "a");
        assert_eq!(second.message_id(), "b");
        assert!(queue.dequeue(Duration::ZERO).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scheduled_tasks_wait_for_promotion() {
        let queue = MemoryQueue::new();
        let now = SystemTime::now();
        queue
            .enqueue_at(&dispatch("later"), now + Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(queue.depth().await.unwrap(), 0);
        assert_eq!(queue.scheduled_depth().await.unwrap(), 1);

        // Not yet due.
        assert_eq!(queue.promote_due(now).await.unwrap(), 0);
        assert!(queue.dequeue(Duration::ZERO).await.unwrap().is_none());

        // Due now.
        let promoted = queue
            .promote_due(now + Duration::from_secs(61))
            .await
            .unwrap();
        assert_eq!(promoted, 1);
        assert_eq!(
            queue
                .dequeue(Duration::ZERO)
                .await
                .unwrap()
                .unwrap()
                .message_id(),
            "later"
        );
    }
}
