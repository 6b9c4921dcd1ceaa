use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::db::models::{Exam, Teacher};
use crate::repositories;

pub(crate) const ADMIN_USERNAME: &str = "admin";

pub(crate) struct CurrentTeacher(pub(crate) Teacher);
pub(crate) struct CurrentAdmin;

/// Either kind of desk staff. Admins manage every exam, teachers their own.
pub(crate) enum Staff {
    Admin,
    Teacher(Teacher),
}

impl Staff {
    pub(crate) fn can_manage(&self, exam: &Exam) -> bool {
        match self {
            Staff::Admin => true,
            Staff::Teacher(teacher) => exam.teacher_id == teacher.id,
        }
    }

    pub(crate) fn ensure_manages(&self, exam: &Exam) -> Result<(), ApiError> {
        if self.can_manage(exam) {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Exam belongs to another teacher"))
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentTeacher {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let app_state = app_state(parts, state).await?;
        let (email, password) = basic_credentials(parts)?;
        let teacher = authenticate_teacher(&app_state, &email, &password).await?;
        Ok(CurrentTeacher(teacher))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let app_state = app_state(parts, state).await?;
        let (username, password) = basic_credentials(parts)?;
        if username != ADMIN_USERNAME {
            return Err(ApiError::Forbidden("Admin access required"));
        }
        authenticate_admin(&app_state, &password).await?;
        Ok(CurrentAdmin)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Staff {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let app_state = app_state(parts, state).await?;
        let (username, password) = basic_credentials(parts)?;
        if username == ADMIN_USERNAME {
            authenticate_admin(&app_state, &password).await?;
            return Ok(Staff::Admin);
        }
        let teacher = authenticate_teacher(&app_state, &username, &password).await?;
        Ok(Staff::Teacher(teacher))
    }
}

async fn app_state(parts: &mut Parts, state: &AppState) -> Result<AppState, ApiError> {
    let State(app_state) = State::<AppState>::from_request_parts(parts, state)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;
    Ok(app_state)
}

fn basic_credentials(parts: &Parts) -> Result<(String, String), ApiError> {
    let auth_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

    let encoded = auth_header
        .strip_prefix("Basic ")
        .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

    let decoded = STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

    let (username, password) = decoded
        .split_once(':')
        .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

    Ok((username.to_string(), password.to_string()))
}

/// Email/password check shared by the login endpoint and the Basic guards.
pub(crate) async fn authenticate_teacher(
    state: &AppState,
    email: &str,
    password: &str,
) -> Result<Teacher, ApiError> {
    let teacher = repositories::teachers::find_by_email(state.store(), email)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load teacher"))?;

    let Some(teacher) = teacher else {
        return Err(ApiError::Unauthorized("Invalid email or password"));
    };
    if teacher.password != password {
        return Err(ApiError::Unauthorized("Invalid email or password"));
    }
    if !teacher.approved {
        return Err(ApiError::Forbidden("Teacher account is awaiting approval"));
    }

    Ok(teacher)
}

pub(crate) async fn authenticate_admin(state: &AppState, password: &str) -> Result<(), ApiError> {
    let config = repositories::app_config::find(state.store())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load application config"))?;

    match config {
        Some(config) if !config.admin_password.is_empty() && config.admin_password == password => {
            Ok(())
        }
        _ => Err(ApiError::Unauthorized("Invalid admin password")),
    }
}
