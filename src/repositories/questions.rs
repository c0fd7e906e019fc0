use sqlx::PgPool;

use crate::db::models::Question;

/// Question definitions are owned by an exam; callers address them by the
/// exam's subject, so the lookup joins through `exams`. Ordering matches the
/// paper layout so cached sets stay stable across reloads.
pub(crate) async fn list_by_subject(
    pool: &PgPool,
    subject: &str,
) -> Result<Vec<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(
        "SELECT q.id, q.exam_id, q.question_number, q.sub_question_number, \
                q.question_type, q.answer, q.answer_count, q.point, q.created_at
         FROM questions q
         JOIN exams e ON e.id = q.exam_id
         WHERE e.subject = $1
         ORDER BY q.question_number, q.sub_question_number",
    )
    .bind(subject)
    .fetch_all(pool)
    .await
}
