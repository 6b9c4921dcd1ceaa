use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// Number of answer options every question carries.
pub const OPTION_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub approved: bool,
    pub password: String,
    #[serde(default, alias = "schoolName")]
    pub school_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    #[serde(alias = "questionText")]
    pub question_text: String,
    pub options: [String; OPTION_COUNT],
    #[serde(alias = "correctAnswerIndex")]
    pub correct_answer_index: u8,
}

impl Question {
    pub fn is_correct(&self, selected: Option<u8>) -> bool {
        selected == Some(self.correct_answer_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exam {
    pub id: String,
    #[serde(alias = "teacherId")]
    pub teacher_id: String,
    pub subject: String,
    pub title: String,
    pub questions: Vec<Question>,
    #[serde(alias = "totalQuestions")]
    pub total_questions: u32,
    /// Minutes allotted to one attempt.
    #[serde(alias = "timeLimit")]
    pub time_limit: u32,
    /// Minutes that must pass before a student may submit by hand.
    #[serde(default, alias = "minSubmitTime")]
    pub min_submit_time: u32,
    #[serde(alias = "isActive")]
    pub is_active: bool,
    #[serde(default, alias = "examCode")]
    pub exam_code: String,
    #[serde(default, alias = "requireFullscreen")]
    pub require_fullscreen: bool,
    #[serde(default, alias = "restrictedRoom")]
    pub restricted_room: Option<String>,
    #[serde(default, alias = "restrictedGrade")]
    pub restricted_grade: Option<String>,
    #[serde(default, alias = "schoolName")]
    pub school_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnswerKeyError {
    #[error("question bank is empty")]
    EmptyBank,
    #[error("total_questions must be at least 1")]
    NoQuestionsDrawn,
    #[error("question id '{0}' appears twice")]
    DuplicateQuestionId(String),
    #[error("question '{question_id}' has correct index {index} outside 0..=3")]
    CorrectIndexOutOfRange { question_id: String, index: u8 },
}

impl Exam {
    pub fn time_limit_seconds(&self) -> u32 {
        self.time_limit.saturating_mul(60)
    }

    pub fn min_submit_seconds(&self) -> u32 {
        self.min_submit_time.saturating_mul(60)
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == question_id)
    }

    /// Checks the invariants scoring relies on: a non-empty bank, unique ids and
    /// a correct index inside the four options of every question.
    pub fn validate_key(&self) -> Result<(), AnswerKeyError> {
        if self.questions.is_empty() {
            return Err(AnswerKeyError::EmptyBank);
        }
        if self.total_questions == 0 {
            return Err(AnswerKeyError::NoQuestionsDrawn);
        }

        let mut seen = std::collections::HashSet::with_capacity(self.questions.len());
        for question in &self.questions {
            if !seen.insert(question.id.as_str()) {
                return Err(AnswerKeyError::DuplicateQuestionId(question.id.clone()));
            }
            if usize::from(question.correct_answer_index) >= OPTION_COUNT {
                return Err(AnswerKeyError::CorrectIndexOutOfRange {
                    question_id: question.id.clone(),
                    index: question.correct_answer_index,
                });
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub prefix: String,
    #[serde(alias = "firstName")]
    pub first_name: String,
    #[serde(alias = "lastName")]
    pub last_name: String,
    pub grade: String,
    pub room: String,
    pub number: String,
}

impl Student {
    pub fn display_name(&self) -> String {
        format!("{}{} {}", self.prefix, self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentAnswer {
    #[serde(alias = "questionId")]
    pub question_id: String,
    #[serde(alias = "selectedAnswerIndex")]
    pub selected_answer_index: Option<u8>,
}

impl StudentAnswer {
    pub fn unanswered(question_id: impl Into<String>) -> Self {
        Self { question_id: question_id.into(), selected_answer_index: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExamResult {
    pub id: String,
    #[serde(alias = "examId")]
    pub exam_id: String,
    pub student: Student,
    pub score: u32,
    pub total: u32,
    #[serde(alias = "submittedAt", with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
    pub answers: Vec<StudentAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(alias = "adminPassword")]
    pub admin_password: String,
}
