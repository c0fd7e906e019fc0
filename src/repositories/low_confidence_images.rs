use sqlx::types::Json;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::LowConfidenceImage;

/// Create-or-replace keyed by subject; the latest batch for a subject wins.
pub(crate) async fn upsert_by_subject(
    pool: &PgPool,
    id: &str,
    subject: &str,
    exam_date: Option<&str>,
    images: &[LowConfidenceImage],
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO low_confidence_batches \
            (id, subject, exam_date, images, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $5)
         ON CONFLICT (subject) DO UPDATE SET
            exam_date = EXCLUDED.exam_date,
            images = EXCLUDED.images,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(id)
    .bind(subject)
    .bind(exam_date)
    .bind(Json(images))
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}
