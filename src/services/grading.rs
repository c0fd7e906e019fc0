use crate::db::models::{GradedAnswer, Question};
use crate::db::types::QuestionType;

/// Stored in place of the recognized answer when confidence is below the
/// gate; reviewers filter on this value to find answers needing a second
/// look.
pub(crate) const MANUAL_REVIEW_SENTINEL: &str = "NEEDS_REVIEW";

/// One raw answer unit from an inbound event; lives only for the duration
/// of a grading call.
#[derive(Debug, Clone)]
pub(crate) struct AnswerSubmission {
    pub(crate) question_number: i32,
    pub(crate) sub_question_number: i32,
    pub(crate) student_answer: String,
    pub(crate) confidence: f64,
    pub(crate) question_type: QuestionType,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct GradingOutcome {
    pub(crate) graded: Vec<GradedAnswer>,
    pub(crate) total_score: f64,
}

/// Auto-grade a batch of submissions against the subject's question set.
///
/// Pure function of its inputs: answers without a matching question are
/// logged and skipped, answers below the confidence gate are persisted
/// ungraded with the review sentinel, everything else is compared after
/// normalization. The returned total is the sum of the returned scores.
pub(crate) fn grade(
    subject: &str,
    answers: &[AnswerSubmission],
    questions: &[Question],
    confidence_threshold: f64,
) -> GradingOutcome {
    let mut outcome = GradingOutcome::default();

    for answer in answers {
        let question = questions.iter().find(|q| {
            q.question_number == answer.question_number
                && q.sub_question_number == answer.sub_question_number
        });

        let Some(question) = question else {
            tracing::warn!(
                subject,
                question_number = answer.question_number,
                sub_question_number = answer.sub_question_number,
                "No question definition found; skipping answer"
            );
            continue;
        };

        let graded = if answer.confidence < confidence_threshold {
            GradedAnswer {
                question_number: answer.question_number,
                sub_question_number: answer.sub_question_number,
                student_answer: MANUAL_REVIEW_SENTINEL.to_string(),
                answer_count: question.answer_count,
                confidence: answer.confidence,
                is_correct: false,
                score: 0.0,
            }
        } else {
            let normalized = normalize_answer(&answer.student_answer, answer.question_type);
            let is_correct = answers_match(&normalized, &question.answer);
            let score = if is_correct { question.point } else { 0.0 };
            GradedAnswer {
                question_number: answer.question_number,
                sub_question_number: answer.sub_question_number,
                student_answer: normalized,
                answer_count: question.answer_count,
                confidence: answer.confidence,
                is_correct,
                score,
            }
        };

        outcome.total_score += graded.score;
        outcome.graded.push(graded);
    }

    outcome
}

/// Trim, and for true/false questions map the recognizer's `1`/`0` output
/// onto the `T`/`F` labels used in answer keys.
pub(crate) fn normalize_answer(raw: &str, question_type: QuestionType) -> String {
    let trimmed = raw.trim();
    if question_type == QuestionType::TrueFalse {
        match trimmed {
            "1" => return "T".to_string(),
            "0" => return "F".to_string(),
            _ => {}
        }
    }
    trimmed.to_string()
}

pub(crate) fn answers_match(student_answer: &str, correct_answer: &str) -> bool {
    student_answer.trim().to_lowercase() == correct_answer.trim().to_lowercase()
}
