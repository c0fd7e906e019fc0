pub(crate) mod corrections;
pub(crate) mod grading;
pub(crate) mod lock;
pub(crate) mod question_cache;
pub(crate) mod responses;
pub(crate) mod student_images;

use thiserror::Error;

/// Failures of the grading pipeline. Lock contention is not represented
/// here: a lock that could not be acquired is an expected outcome
/// (`LockOutcome::NotAcquired`), not an error.
#[derive(Debug, Error)]
pub(crate) enum GradingError {
    #[error("no graded response exists for student {student_id} in subject {subject}")]
    AggregateNotFound { student_id: String, subject: String },
    #[error("question cache serialization failed")]
    CacheSerialization(#[from] serde_json::Error),
    #[error("cache store unavailable")]
    CacheStore(#[from] redis::RedisError),
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
