use serde::Deserialize;
use validator::Validate;

use crate::db::models::{Student, StudentAnswer};

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ResultCreate {
    #[serde(alias = "examId")]
    #[validate(length(min = 1, message = "exam_id must not be empty"))]
    pub(crate) exam_id: String,
    pub(crate) student: Student,
    pub(crate) score: u32,
    #[validate(range(min = 1, message = "total must be at least 1"))]
    pub(crate) total: u32,
    #[serde(default)]
    pub(crate) answers: Vec<StudentAnswer>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResultDeleteQuery {
    #[serde(default)]
    pub(crate) room: Option<String>,
}
