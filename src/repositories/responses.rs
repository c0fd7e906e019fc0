use sqlx::PgPool;

use crate::db::models::StudentResponse;

const COLUMNS: &str = "id, student_id, subject, answers, total_score, created_at, updated_at";

pub(crate) async fn find_by_student_and_subject(
    pool: &PgPool,
    student_id: &str,
    subject: &str,
) -> Result<Option<StudentResponse>, sqlx::Error> {
    sqlx::query_as::<_, StudentResponse>(&format!(
        "SELECT {COLUMNS} FROM student_responses WHERE student_id = $1 AND subject = $2"
    ))
    .bind(student_id)
    .bind(subject)
    .fetch_optional(pool)
    .await
}

/// Persist the merged aggregate. The `(student_id, subject)` unique key is
/// the identity; the row id only exists for bookkeeping.
pub(crate) async fn upsert(
    pool: &PgPool,
    response: &StudentResponse,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO student_responses \
            (id, student_id, subject, answers, total_score, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (student_id, subject) DO UPDATE SET
            answers = EXCLUDED.answers,
            total_score = EXCLUDED.total_score,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(&response.id)
    .bind(&response.student_id)
    .bind(&response.subject)
    .bind(&response.answers)
    .bind(response.total_score)
    .bind(response.created_at)
    .bind(response.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}
