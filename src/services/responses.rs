use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::time::primitive_now_utc;
use crate::db::models::{GradedAnswer, StudentResponse};
use crate::repositories;
use crate::services::GradingError;

/// Replace-by-key merge: each incoming answer evicts any existing entry
/// with the same `(question_number, sub_question_number)` before being
/// appended, and the total is re-derived from what remains. An externally
/// supplied total is never trusted.
pub(crate) fn merge_answers(aggregate: &mut StudentResponse, graded: Vec<GradedAnswer>) {
    for answer in graded {
        let key = answer.key();
        aggregate.answers.0.retain(|existing| existing.key() != key);
        aggregate.answers.0.push(answer);
    }
    aggregate.total_score = aggregate.answers.0.iter().map(|a| a.score).sum();
}

pub(crate) fn empty_aggregate(student_id: &str, subject: &str) -> StudentResponse {
    let now = primitive_now_utc();
    StudentResponse {
        id: Uuid::new_v4().to_string(),
        student_id: student_id.to_string(),
        subject: subject.to_string(),
        answers: Json(Vec::new()),
        total_score: 0.0,
        created_at: now,
        updated_at: now,
    }
}

/// Find-or-create the aggregate for `(student, subject)`, merge the graded
/// answers into it and persist. The only mutation path during normal
/// event-driven grading.
pub(crate) async fn upsert_and_merge(
    pool: &PgPool,
    student_id: &str,
    subject: &str,
    graded: Vec<GradedAnswer>,
) -> Result<StudentResponse, GradingError> {
    let mut aggregate =
        repositories::responses::find_by_student_and_subject(pool, student_id, subject)
            .await?
            .unwrap_or_else(|| empty_aggregate(student_id, subject));

    merge_answers(&mut aggregate, graded);
    aggregate.updated_at = primitive_now_utc();

    repositories::responses::upsert(pool, &aggregate).await?;
    Ok(aggregate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graded(qn: i32, sqn: i32, answer: &str, score: f64) -> GradedAnswer {
        GradedAnswer {
            question_number: qn,
            sub_question_number: sqn,
            student_answer: answer.to_string(),
            answer_count: 1,
            confidence: 0.9,
            is_correct: score > 0.0,
            score,
        }
    }

    #[test]
    fn merge_appends_new_answers_and_sums_total() {
        let mut aggregate = empty_aggregate("s1", "math");

        merge_answers(&mut aggregate, vec![graded(1, 1, "42", 10.0), graded(2, 1, "x", 0.0)]);

        assert_eq!(aggregate.answers.0.len(), 2);
        assert_eq!(aggregate.total_score, 10.0);
    }

    #[test]
    fn merge_replaces_existing_entry_with_same_key() {
        let mut aggregate = empty_aggregate("s1", "math");
        merge_answers(&mut aggregate, vec![graded(1, 1, "42", 10.0)]);

        merge_answers(&mut aggregate, vec![graded(1, 1, "43", 0.0)]);

        assert_eq!(aggregate.answers.0.len(), 1);
        assert_eq!(aggregate.answers.0[0].student_answer, "43");
        assert_eq!(aggregate.total_score, 0.0);
    }

    #[test]
    fn merge_is_idempotent_per_key() {
        let mut aggregate = empty_aggregate("s1", "math");
        let answer = graded(3, 2, "ok", 5.0);

        merge_answers(&mut aggregate, vec![answer.clone()]);
        let total_after_first = aggregate.total_score;
        merge_answers(&mut aggregate, vec![answer]);

        assert_eq!(aggregate.answers.0.len(), 1);
        assert_eq!(aggregate.total_score, total_after_first);
    }

    #[test]
    fn merge_keeps_unrelated_keys_intact() {
        let mut aggregate = empty_aggregate("s1", "math");
        merge_answers(&mut aggregate, vec![graded(1, 1, "a", 3.0), graded(1, 2, "b", 4.0)]);

        merge_answers(&mut aggregate, vec![graded(1, 1, "c", 0.0)]);

        assert_eq!(aggregate.answers.0.len(), 2);
        assert_eq!(aggregate.total_score, 4.0);
        let untouched =
            aggregate.answers.0.iter().find(|a| a.key() == (1, 2)).expect("entry kept");
        assert_eq!(untouched.student_answer, "b");
    }

    #[test]
    fn merge_never_trusts_a_supplied_total() {
        let mut aggregate = empty_aggregate("s1", "math");
        aggregate.total_score = 999.0;

        merge_answers(&mut aggregate, vec![graded(1, 1, "42", 10.0)]);

        assert_eq!(aggregate.total_score, 10.0);
    }
}
