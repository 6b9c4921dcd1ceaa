use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::validation::{validate_password_len, validate_payload};
use crate::core::state::AppState;
use crate::db::models::Teacher;
use crate::repositories;
use crate::repositories::teachers::CreateTeacher;
use crate::schemas::teacher::{TeacherCreate, TeacherResponse};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(register_teacher).get(list_teachers))
        .route("/:teacher_id/approve", post(approve_teacher))
        .route("/:teacher_id", delete(delete_teacher))
}

/// Self-registration. Accounts start unapproved until an admin signs them off.
async fn register_teacher(
    State(state): State<AppState>,
    Json(payload): Json<TeacherCreate>,
) -> Result<(StatusCode, Json<TeacherResponse>), ApiError> {
    validate_payload(&payload)?;
    validate_password_len(&payload.password)?;

    let existing = repositories::teachers::find_by_email(state.store(), &payload.email)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check teacher email"))?;
    if existing.is_some() {
        return Err(ApiError::Conflict("A teacher with this email already exists".to_string()));
    }

    let teacher = repositories::teachers::create(
        state.store(),
        CreateTeacher {
            name: payload.name.trim().to_string(),
            email: payload.email.trim().to_string(),
            password: payload.password,
            school_name: payload.school_name.filter(|name| !name.trim().is_empty()),
            approved: false,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to register teacher"))?;

    tracing::info!(teacher_id = %teacher.id, "Teacher registered, awaiting approval");
    Ok((StatusCode::CREATED, Json(TeacherResponse::from(teacher))))
}

async fn list_teachers(
    _admin: CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<TeacherResponse>>, ApiError> {
    let teachers = repositories::teachers::list(state.store())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list teachers"))?;

    Ok(Json(teachers.into_iter().map(TeacherResponse::from).collect()))
}

async fn approve_teacher(
    _admin: CurrentAdmin,
    Path(teacher_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<TeacherResponse>, ApiError> {
    find_teacher(&state, &teacher_id).await?;

    let teacher = repositories::teachers::set_approved(state.store(), &teacher_id, true)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to approve teacher"))?;

    tracing::info!(teacher_id = %teacher.id, "Teacher approved");
    Ok(Json(TeacherResponse::from(teacher)))
}

/// Removes the account only; exams the teacher authored stay for the admin.
async fn delete_teacher(
    _admin: CurrentAdmin,
    Path(teacher_id): Path<String>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    find_teacher(&state, &teacher_id).await?;

    repositories::teachers::delete(state.store(), &teacher_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete teacher"))?;

    tracing::info!(teacher_id = %teacher_id, "Teacher deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn find_teacher(state: &AppState, teacher_id: &str) -> Result<Teacher, ApiError> {
    repositories::teachers::find_by_id(state.store(), teacher_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load teacher"))?
        .ok_or_else(|| ApiError::NotFound("Teacher not found".to_string()))
}
