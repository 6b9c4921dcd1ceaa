use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::db::models::{Exam, Question, OPTION_COUNT};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub(crate) struct QuestionInput {
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(alias = "questionText")]
    #[validate(length(min = 1, message = "question_text must not be empty"))]
    pub(crate) question_text: String,
    pub(crate) options: [String; OPTION_COUNT],
    #[serde(alias = "correctAnswerIndex")]
    #[validate(range(max = 3, message = "correct_answer_index must be between 0 and 3"))]
    pub(crate) correct_answer_index: u8,
}

impl QuestionInput {
    /// Questions without an id get a fresh one.
    pub(crate) fn into_question(self) -> Question {
        let id = self
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Question {
            id,
            question_text: self.question_text,
            options: self.options,
            correct_answer_index: self.correct_answer_index,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 1, message = "subject must not be empty"))]
    pub(crate) subject: String,
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[validate(length(min = 1, message = "exam needs at least one question"), nested)]
    pub(crate) questions: Vec<QuestionInput>,
    #[serde(alias = "totalQuestions")]
    #[validate(range(min = 1, message = "total_questions must be at least 1"))]
    pub(crate) total_questions: u32,
    #[serde(alias = "timeLimit")]
    #[validate(range(min = 1, message = "time_limit must be at least 1 minute"))]
    pub(crate) time_limit: u32,
    #[serde(default, alias = "minSubmitTime")]
    pub(crate) min_submit_time: u32,
    #[serde(default, alias = "isActive")]
    pub(crate) is_active: bool,
    #[serde(default, alias = "requireFullscreen")]
    pub(crate) require_fullscreen: bool,
    #[serde(default, alias = "restrictedRoom")]
    pub(crate) restricted_room: Option<String>,
    #[serde(default, alias = "restrictedGrade")]
    pub(crate) restricted_grade: Option<String>,
    #[serde(default, alias = "schoolName")]
    pub(crate) school_name: Option<String>,
}

/// Partial update. For the restriction fields an explicit `null` clears the
/// restriction while a missing key leaves it alone.
#[derive(Debug, Default, Deserialize, Validate)]
pub(crate) struct ExamUpdate {
    #[serde(default)]
    #[validate(length(min = 1, message = "subject must not be empty"))]
    pub(crate) subject: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: Option<String>,
    #[serde(default)]
    #[validate(length(min = 1, message = "exam needs at least one question"), nested)]
    pub(crate) questions: Option<Vec<QuestionInput>>,
    #[serde(default, alias = "totalQuestions")]
    #[validate(range(min = 1, message = "total_questions must be at least 1"))]
    pub(crate) total_questions: Option<u32>,
    #[serde(default, alias = "timeLimit")]
    #[validate(range(min = 1, message = "time_limit must be at least 1 minute"))]
    pub(crate) time_limit: Option<u32>,
    #[serde(default, alias = "minSubmitTime")]
    pub(crate) min_submit_time: Option<u32>,
    #[serde(default, alias = "requireFullscreen")]
    pub(crate) require_fullscreen: Option<bool>,
    #[serde(default, alias = "restrictedRoom", deserialize_with = "explicit_null")]
    pub(crate) restricted_room: Option<Option<String>>,
    #[serde(default, alias = "restrictedGrade", deserialize_with = "explicit_null")]
    pub(crate) restricted_grade: Option<Option<String>>,
}

fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExamActivation {
    #[serde(alias = "isActive")]
    pub(crate) is_active: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamLookupRequest {
    #[serde(alias = "examCode")]
    #[validate(length(min = 1, message = "exam_code must not be empty"))]
    pub(crate) exam_code: String,
    #[serde(default)]
    pub(crate) room: Option<String>,
    #[serde(default)]
    pub(crate) grade: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamStatusResponse {
    pub(crate) id: String,
    pub(crate) exam_code: String,
    pub(crate) is_active: bool,
}

impl From<&Exam> for ExamStatusResponse {
    fn from(exam: &Exam) -> Self {
        Self { id: exam.id.clone(), exam_code: exam.exam_code.clone(), is_active: exam.is_active }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_distinguishes_null_from_missing() {
        let cleared: ExamUpdate =
            serde_json::from_value(json!({ "restrictedRoom": null })).expect("parse");
        assert_eq!(cleared.restricted_room, Some(None));
        assert_eq!(cleared.restricted_grade, None);

        let set: ExamUpdate =
            serde_json::from_value(json!({ "restricted_grade": "M.5" })).expect("parse");
        assert_eq!(set.restricted_grade, Some(Some("M.5".into())));
    }

    #[test]
    fn create_rejects_bad_answer_index() {
        let payload: ExamCreate = serde_json::from_value(json!({
            "subject": "Math",
            "title": "Quiz",
            "questions": [{
                "questionText": "1 + 1",
                "options": ["1", "2", "3", "4"],
                "correctAnswerIndex": 4
            }],
            "totalQuestions": 1,
            "timeLimit": 10
        }))
        .expect("parse");

        assert!(payload.validate().is_err());
    }

    #[test]
    fn question_without_id_gets_one() {
        let input = QuestionInput {
            id: Some("  ".into()),
            question_text: "Capital of Thailand".into(),
            options: ["Bangkok".into(), "Chiang Mai".into(), "Phuket".into(), "Khon Kaen".into()],
            correct_answer_index: 0,
        };
        let question = input.into_question();
        assert!(!question.id.is_empty());
        assert_ne!(question.id.trim(), "");
    }
}
