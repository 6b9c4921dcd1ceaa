use validator::Validate;

use crate::api::errors::ApiError;
use crate::db::models::{Exam, Student};

pub(crate) const MIN_PASSWORD_LEN: usize = 4;

pub(crate) fn validate_payload(payload: &impl Validate) -> Result<(), ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))
}

pub(crate) fn validate_password_len(password: &str) -> Result<(), ApiError> {
    if password.chars().count() >= MIN_PASSWORD_LEN {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )))
    }
}

/// Checks an exam about to be stored: a usable answer key, a minimum
/// submit time inside the time limit and non-empty option texts.
pub(crate) fn validate_exam(exam: &Exam) -> Result<(), ApiError> {
    exam.validate_key().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if exam.min_submit_time > exam.time_limit {
        return Err(ApiError::BadRequest(
            "min_submit_time cannot exceed time_limit".to_string(),
        ));
    }

    for question in &exam.questions {
        if question.options.iter().any(|option| option.trim().is_empty()) {
            return Err(ApiError::BadRequest(format!(
                "Question '{}' has an empty option",
                question.id
            )));
        }
    }

    Ok(())
}

pub(crate) fn validate_student(student: &Student) -> Result<(), ApiError> {
    if student.first_name.trim().is_empty() || student.last_name.trim().is_empty() {
        return Err(ApiError::BadRequest("Student first and last name are required".to_string()));
    }
    Ok(())
}
