use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};

use crate::api::errors::ApiError;
use crate::api::guards::{self, CurrentAdmin, ADMIN_USERNAME};
use crate::api::validation::{validate_password_len, validate_payload};
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::auth::{AdminLogin, AdminPasswordChange, TeacherLogin};
use crate::schemas::teacher::TeacherResponse;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/teacher-login", post(teacher_login))
        .route("/admin-login", post(admin_login))
        .route("/admin-password", post(change_admin_password))
}

async fn teacher_login(
    State(state): State<AppState>,
    Json(payload): Json<TeacherLogin>,
) -> Result<Json<TeacherResponse>, ApiError> {
    validate_payload(&payload)?;

    let teacher = guards::authenticate_teacher(&state, &payload.email, &payload.password).await?;
    tracing::info!(teacher_id = %teacher.id, "Teacher signed in");

    Ok(Json(TeacherResponse::from(teacher)))
}

async fn admin_login(
    State(state): State<AppState>,
    Json(payload): Json<AdminLogin>,
) -> Result<Json<Value>, ApiError> {
    validate_payload(&payload)?;
    guards::authenticate_admin(&state, &payload.password).await?;
    tracing::info!("Admin signed in");

    Ok(Json(json!({ "username": ADMIN_USERNAME })))
}

async fn change_admin_password(
    _admin: CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<AdminPasswordChange>,
) -> Result<StatusCode, ApiError> {
    validate_password_len(&payload.new_password)?;

    repositories::app_config::set_admin_password(state.store(), &payload.new_password)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update admin password"))?;
    tracing::info!("Admin password changed");

    Ok(StatusCode::NO_CONTENT)
}
