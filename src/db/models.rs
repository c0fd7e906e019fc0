use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::QuestionType;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Student {
    pub(crate) student_id: String,
    pub(crate) student_name: String,
    pub(crate) created_at: PrimitiveDateTime,
}

/// One question definition within a finalized exam. `answer` holds the raw
/// correct answer, comma-separated for multi-part questions; `answer_count`
/// is its derived cardinality.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) question_number: i32,
    pub(crate) sub_question_number: i32,
    pub(crate) question_type: QuestionType,
    pub(crate) answer: String,
    pub(crate) answer_count: i32,
    pub(crate) point: f64,
    pub(crate) created_at: PrimitiveDateTime,
}

/// Persisted unit of grading output. Unique within an aggregate by
/// `(question_number, sub_question_number)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct GradedAnswer {
    pub(crate) question_number: i32,
    pub(crate) sub_question_number: i32,
    pub(crate) student_answer: String,
    pub(crate) answer_count: i32,
    pub(crate) confidence: f64,
    pub(crate) is_correct: bool,
    pub(crate) score: f64,
}

impl GradedAnswer {
    pub(crate) fn key(&self) -> (i32, i32) {
        (self.question_number, self.sub_question_number)
    }
}

/// Per-(student, subject) response aggregate. `total_score` is always the
/// sum of the contained graded-answer scores.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct StudentResponse {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) subject: String,
    pub(crate) answers: Json<Vec<GradedAnswer>>,
    pub(crate) total_score: f64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct LowConfidenceImage {
    pub(crate) student_id: String,
    pub(crate) file_name: String,
    pub(crate) base64_data: String,
    pub(crate) question_number: i32,
    pub(crate) sub_question_number: i32,
}

