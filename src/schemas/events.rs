use serde::{Deserialize, Serialize};

use crate::db::models::LowConfidenceImage;
use crate::db::types::QuestionType;
use crate::services::grading::AnswerSubmission;
use crate::services::GradingError;

/// One "student answered an exam" message from the recognition pipeline.
///
/// Deserialization is deliberately tolerant: unknown fields are dropped and
/// optional fields default, but a message missing `student_id`, `subject` or
/// the per-answer identity fields is rejected as malformed. The event-level
/// `total_score` is accepted and then ignored; totals are always derived
/// from the graded answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AnswerSubmissionEvent {
    pub(crate) student_id: String,
    #[serde(default)]
    pub(crate) student_name: String,
    pub(crate) subject: String,
    #[serde(default)]
    pub(crate) answers: Vec<AnswerEventItem>,
    #[serde(default)]
    pub(crate) total_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AnswerEventItem {
    pub(crate) question_number: i32,
    #[serde(default)]
    pub(crate) sub_question_number: i32,
    pub(crate) student_answer: String,
    #[serde(default)]
    pub(crate) answer_count: i32,
    pub(crate) confidence: f64,
    #[serde(default)]
    pub(crate) question_type: QuestionType,
    #[serde(default)]
    pub(crate) is_correct: bool,
    #[serde(default)]
    pub(crate) score: f64,
    #[serde(default)]
    pub(crate) point: f64,
}

impl AnswerSubmissionEvent {
    pub(crate) fn to_submissions(&self) -> Vec<AnswerSubmission> {
        self.answers
            .iter()
            .map(|item| AnswerSubmission {
                question_number: item.question_number,
                sub_question_number: item.sub_question_number,
                student_answer: item.student_answer.clone(),
                confidence: item.confidence,
                question_type: item.question_type,
            })
            .collect()
    }
}

/// Batch of below-threshold answer crops for manual review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LowConfidenceImageEvent {
    pub(crate) subject: String,
    #[serde(default)]
    pub(crate) exam_date: Option<String>,
    #[serde(default)]
    pub(crate) images: Vec<LowConfidenceImage>,
}

/// Student-identity crops the recognition stage could not attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StudentIdImageEvent {
    #[serde(default)]
    pub(crate) status: Option<String>,
    pub(crate) subject: String,
    #[serde(rename = "lowConfidenceImages", alias = "low_confidence_images", default)]
    pub(crate) images: Vec<StudentIdImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StudentIdImage {
    #[serde(default)]
    pub(crate) file_name: String,
    #[serde(default)]
    pub(crate) base64_data: String,
}

pub(crate) fn decode_answer_event(payload: &str) -> Result<AnswerSubmissionEvent, GradingError> {
    serde_json::from_str(payload).map_err(|err| GradingError::MalformedEvent(err.to_string()))
}

pub(crate) fn decode_low_confidence_event(
    payload: &str,
) -> Result<LowConfidenceImageEvent, GradingError> {
    serde_json::from_str(payload).map_err(|err| GradingError::MalformedEvent(err.to_string()))
}

pub(crate) fn decode_student_id_event(
    payload: &str,
) -> Result<StudentIdImageEvent, GradingError> {
    serde_json::from_str(payload).map_err(|err| GradingError::MalformedEvent(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_event_ignores_unknown_fields() {
        let payload = r#"{
            "student_id": "20230001",
            "student_name": "Kim",
            "subject": "math",
            "answers": [{
                "question_number": 1,
                "sub_question_number": 1,
                "student_answer": "42",
                "answer_count": 1,
                "confidence": 0.93,
                "question_type": "short_answer",
                "is_correct": false,
                "score": 0,
                "point": 10,
                "recognition_model": "v3"
            }],
            "total_score": 0,
            "trace_id": "abc-123"
        }"#;

        let event = decode_answer_event(payload).expect("decode");
        assert_eq!(event.student_id, "20230001");
        assert_eq!(event.answers.len(), 1);
        assert_eq!(event.answers[0].question_type, QuestionType::ShortAnswer);
    }

    #[test]
    fn answer_event_missing_student_id_is_malformed() {
        let payload = r#"{"subject": "math", "answers": []}"#;
        let err = decode_answer_event(payload).unwrap_err();
        assert!(matches!(err, GradingError::MalformedEvent(_)));
    }

    #[test]
    fn answer_event_missing_confidence_is_malformed() {
        let payload = r#"{
            "student_id": "s1",
            "subject": "math",
            "answers": [{"question_number": 1, "student_answer": "42"}]
        }"#;
        assert!(decode_answer_event(payload).is_err());
    }

    #[test]
    fn answer_event_defaults_optional_fields() {
        let payload = r#"{
            "student_id": "s1",
            "subject": "math",
            "answers": [{
                "question_number": 3,
                "student_answer": "1",
                "confidence": 0.9,
                "question_type": "TF"
            }]
        }"#;

        let event = decode_answer_event(payload).expect("decode");
        let item = &event.answers[0];
        assert_eq!(item.sub_question_number, 0);
        assert_eq!(item.question_type, QuestionType::TrueFalse);
        assert_eq!(event.total_score, 0.0);
    }

    #[test]
    fn student_id_event_accepts_both_casings() {
        let camel = r#"{
            "subject": "math",
            "lowConfidenceImages": [{"file_name": "a.jpg", "base64_data": "aGk="}]
        }"#;
        let snake = r#"{
            "subject": "math",
            "low_confidence_images": [{"file_name": "a.jpg", "base64_data": "aGk="}]
        }"#;

        assert_eq!(decode_student_id_event(camel).expect("camel").images.len(), 1);
        assert_eq!(decode_student_id_event(snake).expect("snake").images.len(), 1);
    }

    #[test]
    fn low_confidence_event_requires_subject() {
        let payload = r#"{"images": []}"#;
        assert!(decode_low_confidence_event(payload).is_err());
    }
}
