use crate::api::errors::ApiError;
use crate::api::guards::Staff;
use crate::core::state::AppState;
use crate::db::models::Exam;
use crate::repositories;
use crate::services::exam_codes::{generate_unique_code, sanitize_code};

pub(super) async fn load_exam(state: &AppState, exam_id: &str) -> Result<Exam, ApiError> {
    repositories::exams::find_by_id(state.store(), exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam"))?
        .ok_or_else(ApiError::exam_not_found)
}

/// Loads the exam and checks the caller may manage it.
pub(super) async fn load_managed_exam(
    state: &AppState,
    staff: &Staff,
    exam_id: &str,
) -> Result<Exam, ApiError> {
    let exam = load_exam(state, exam_id).await?;
    staff.ensure_manages(&exam)?;
    Ok(exam)
}

/// Codes are always desk-generated so two exams never share one.
pub(super) async fn fresh_exam_code(state: &AppState) -> Result<String, ApiError> {
    let exams = repositories::exams::list(state.store())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;
    Ok(generate_unique_code(exams.iter().map(|exam| exam.exam_code.as_str())))
}

pub(super) fn normalize_restriction(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(super) fn lookup_outcome_label(code: &str, result: &Result<Exam, ApiError>) -> &'static str {
    match result {
        Ok(_) => "admitted",
        Err(ApiError::NotFound(_)) if sanitize_code(code).is_empty() => "invalid_code",
        Err(ApiError::NotFound(_)) => "not_found",
        Err(ApiError::Conflict(_)) => "not_open",
        Err(ApiError::Forbidden(_)) => "restricted",
        Err(_) => "error",
    }
}
