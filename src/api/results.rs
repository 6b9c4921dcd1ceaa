use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::Staff;
use crate::api::validation::{validate_payload, validate_student};
use crate::core::state::AppState;
use crate::db::models::ExamResult;
use crate::repositories;
use crate::repositories::results::CreateResult;
use crate::schemas::result::ResultCreate;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_result))
        .route("/:result_id", delete(delete_result))
}

/// Records a finished attempt. The exam may already be closed: forced
/// submissions arrive right after the teacher deactivates it.
async fn create_result(
    State(state): State<AppState>,
    Json(payload): Json<ResultCreate>,
) -> Result<(StatusCode, Json<ExamResult>), ApiError> {
    validate_payload(&payload)?;
    validate_student(&payload.student)?;

    if payload.score > payload.total {
        return Err(ApiError::BadRequest("score cannot exceed total".to_string()));
    }

    let exam = repositories::exams::find_by_id(state.store(), &payload.exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam"))?
        .ok_or_else(ApiError::exam_not_found)?;

    if let Some(unknown) =
        payload.answers.iter().find(|answer| exam.question(&answer.question_id).is_none())
    {
        return Err(ApiError::BadRequest(format!(
            "Answer refers to unknown question '{}'",
            unknown.question_id
        )));
    }

    let result = repositories::results::create(
        state.store(),
        CreateResult {
            exam_id: exam.id.clone(),
            student: payload.student,
            score: payload.score,
            total: payload.total,
            answers: payload.answers,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to store result"))?;

    tracing::info!(
        result_id = %result.id,
        exam_id = %exam.id,
        room = %result.student.room,
        score = result.score,
        total = result.total,
        "Result stored"
    );
    Ok((StatusCode::CREATED, Json(result)))
}

async fn delete_result(
    staff: Staff,
    Path(result_id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let result = repositories::results::find_by_id(state.store(), &result_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load result"))?
        .ok_or_else(|| ApiError::NotFound("Result not found".to_string()))?;

    // Results of a deleted exam can only be cleaned up by the admin.
    match repositories::exams::find_by_id(state.store(), &result.exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load exam"))?
    {
        Some(exam) => staff.ensure_manages(&exam)?,
        None if matches!(staff, Staff::Admin) => {}
        None => return Err(ApiError::Forbidden("Exam belongs to another teacher")),
    }

    repositories::results::delete(state.store(), &result_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete result"))?;

    tracing::info!(result_id = %result_id, exam_id = %result.exam_id, "Result deleted");
    Ok(StatusCode::NO_CONTENT)
}
