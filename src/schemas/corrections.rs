use serde::{Deserialize, Serialize};

/// Manually corrected answers for one subject, as submitted by a reviewer
/// after inspecting the flagged low-confidence crops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CorrectionBatch {
    pub(crate) subject: String,
    #[serde(default)]
    pub(crate) students: Vec<StudentCorrections>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StudentCorrections {
    pub(crate) student_id: String,
    #[serde(default)]
    pub(crate) answers: Vec<AnswerCorrection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AnswerCorrection {
    pub(crate) question_number: i32,
    #[serde(default)]
    pub(crate) sub_question_number: i32,
    pub(crate) student_answer: String,
}
