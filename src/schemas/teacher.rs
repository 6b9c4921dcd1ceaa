use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::models::Teacher;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct TeacherCreate {
    #[validate(length(min = 1, message = "name must not be empty"))]
    pub(crate) name: String,
    #[validate(email(message = "email is not valid"))]
    pub(crate) email: String,
    pub(crate) password: String,
    #[serde(default, alias = "schoolName")]
    pub(crate) school_name: Option<String>,
}

/// Teacher as shown to clients; the stored password never leaves the desk.
#[derive(Debug, Serialize)]
pub(crate) struct TeacherResponse {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) approved: bool,
    pub(crate) school_name: Option<String>,
}

impl From<Teacher> for TeacherResponse {
    fn from(teacher: Teacher) -> Self {
        Self {
            id: teacher.id,
            name: teacher.name,
            email: teacher.email,
            approved: teacher.approved,
            school_name: teacher.school_name,
        }
    }
}
