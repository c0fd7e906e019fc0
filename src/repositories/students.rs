use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::Student;

const COLUMNS: &str = "student_id, student_name, created_at";

/// Find-or-create keyed by student id. Concurrent events for an unknown
/// student race on the insert, so the conflict path refreshes the name and
/// returns the surviving row.
pub(crate) async fn upsert(
    pool: &PgPool,
    student_id: &str,
    student_name: &str,
    now: PrimitiveDateTime,
) -> Result<Student, sqlx::Error> {
    sqlx::query_as::<_, Student>(&format!(
        "INSERT INTO students (student_id, student_name, created_at)
         VALUES ($1, $2, $3)
         ON CONFLICT (student_id) DO UPDATE SET student_name = EXCLUDED.student_name
         RETURNING {COLUMNS}"
    ))
    .bind(student_id)
    .bind(student_name)
    .bind(now)
    .fetch_one(pool)
    .await
}
