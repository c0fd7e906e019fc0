use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tokio::time::Instant;
use uuid::Uuid;

use crate::core::redis::RedisHandle;

const ACQUIRE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of a lock-guarded computation: either the task ran to completion
/// under the lock, or the lock never became free within the wait window and
/// the task was not started.
#[derive(Debug)]
pub(crate) enum LockOutcome<T> {
    Completed(T),
    NotAcquired,
}

/// Named mutual exclusion over Redis. One lock per `(student, subject)`
/// pair serializes grading for that student while leaving other students
/// fully parallel. The lease expires the key even if the holder crashes.
#[derive(Clone)]
pub(crate) struct LockCoordinator {
    redis: RedisHandle,
}

pub(crate) fn grading_lock_key(student_id: &str, subject: &str) -> String {
    format!("grading-lock:{student_id}:{subject}")
}

impl LockCoordinator {
    pub(crate) fn new(redis: RedisHandle) -> Self {
        Self { redis }
    }

    /// Run `task` under the named lock. Acquisition is retried until `wait`
    /// elapses; the lock is released after `task` finishes whether it
    /// succeeded or failed. A task error is returned as an error, but the
    /// release still happens first.
    pub(crate) async fn try_with_lock<F, Fut, T>(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
        task: F,
    ) -> Result<LockOutcome<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + wait;

        let mut acquired = self.redis.try_acquire(key, &token, lease).await?;
        while !acquired {
            let now = Instant::now();
            if now >= deadline {
                return Ok(LockOutcome::NotAcquired);
            }
            let remaining = deadline - now;
            tokio::time::sleep(remaining.min(ACQUIRE_POLL_INTERVAL)).await;
            acquired = self.redis.try_acquire(key, &token, lease).await?;
        }

        let result = task().await;

        match self.redis.release(key, &token).await {
            Ok(true) => {}
            Ok(false) => {
                // Lease expired while the task ran; the lock may have been
                // taken over, so the serialization guarantee was weakened.
                tracing::warn!(key, "Grading lock lease expired before release");
            }
            Err(err) => {
                tracing::warn!(key, error = %err, "Failed to release grading lock");
            }
        }

        result.map(LockOutcome::Completed)
    }
}
