use std::time::Duration;

use sqlx::PgPool;

use crate::core::redis::RedisHandle;
use crate::db::models::Question;
use crate::repositories;
use crate::services::GradingError;

/// Read-through cache over the subject's question set. Entries are JSON
/// blobs under `questions:<subject>` with a fixed TTL; serialization or
/// store failures surface to the caller, never a stale fallback.
#[derive(Clone)]
pub(crate) struct QuestionCache {
    redis: RedisHandle,
    ttl: Duration,
}

pub(crate) fn cache_key(subject: &str) -> String {
    format!("questions:{subject}")
}

impl QuestionCache {
    pub(crate) fn new(redis: RedisHandle, ttl: Duration) -> Self {
        Self { redis, ttl }
    }

    pub(crate) async fn get_questions(
        &self,
        pool: &PgPool,
        subject: &str,
    ) -> Result<Vec<Question>, GradingError> {
        let key = cache_key(subject);

        if let Some(cached) = self.redis.get(&key).await? {
            let questions: Vec<Question> = serde_json::from_str(&cached)?;
            return Ok(questions);
        }

        let questions = repositories::questions::list_by_subject(pool, subject).await?;
        let json = serde_json::to_string(&questions)?;
        self.redis.set_with_ttl(&key, &json, self.ttl).await?;

        tracing::debug!(subject, count = questions.len(), "Question cache populated");
        Ok(questions)
    }

    pub(crate) async fn find_question(
        &self,
        pool: &PgPool,
        subject: &str,
        question_number: i32,
        sub_question_number: i32,
    ) -> Result<Option<Question>, GradingError> {
        let questions = self.get_questions(pool, subject).await?;
        Ok(questions.into_iter().find(|q| {
            q.question_number == question_number && q.sub_question_number == sub_question_number
        }))
    }

    /// Drop the cached set for a subject; the next read repopulates from
    /// the question store. Called after exam edits.
    pub(crate) async fn invalidate(&self, subject: &str) -> Result<(), GradingError> {
        self.redis.delete(&cache_key(subject)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::cache_key;

    #[test]
    fn cache_key_is_namespaced_by_subject() {
        assert_eq!(cache_key("math"), "questions:math");
        assert_eq!(cache_key("computer science"), "questions:computer science");
    }
}
