use serde::{Deserialize, Serialize};
use sqlx::Type;

/// Question kinds as produced by the recognition pipeline. Inbound events
/// historically label true/false questions as `TF`, so deserialization
/// goes through a tolerant string mapping instead of the strict derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case", from = "String")]
#[sqlx(type_name = "questiontype", rename_all = "snake_case")]
pub(crate) enum QuestionType {
    ShortAnswer,
    TrueFalse,
    Descriptive,
    Other,
}

impl Default for QuestionType {
    fn default() -> Self {
        QuestionType::Other
    }
}

impl From<String> for QuestionType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "short_answer" | "short" => QuestionType::ShortAnswer,
            "true_false" | "tf" => QuestionType::TrueFalse,
            "descriptive" | "essay" => QuestionType::Descriptive,
            _ => QuestionType::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::QuestionType;

    #[test]
    fn legacy_tf_label_maps_to_true_false() {
        let parsed: QuestionType = serde_json::from_str("\"TF\"").unwrap();
        assert_eq!(parsed, QuestionType::TrueFalse);
    }

    #[test]
    fn unknown_labels_fall_back_to_other() {
        let parsed: QuestionType = serde_json::from_str("\"matching\"").unwrap();
        assert_eq!(parsed, QuestionType::Other);
    }

    #[test]
    fn snake_case_labels_round_trip() {
        let parsed: QuestionType = serde_json::from_str("\"true_false\"").unwrap();
        assert_eq!(parsed, QuestionType::TrueFalse);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"true_false\"");
    }
}
