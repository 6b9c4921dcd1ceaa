use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::Staff;
use crate::core::state::AppState;
use crate::db::models::{Exam, ExamResult};
use crate::repositories;
use crate::schemas::DeletedResponse;

use super::super::helpers;
use super::super::queries::DeleteResultsQuery;

/// Teachers see the exams they authored, the admin sees every exam.
pub(in crate::api::exams) async fn list_exams(
    staff: Staff,
    State(state): State<AppState>,
) -> Result<Json<Vec<Exam>>, ApiError> {
    let exams = match &staff {
        Staff::Admin => repositories::exams::list(state.store()).await,
        Staff::Teacher(teacher) => {
            repositories::exams::list_by_teacher(state.store(), &teacher.id).await
        }
    }
    .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;

    Ok(Json(exams))
}

pub(in crate::api::exams) async fn list_exam_results(
    staff: Staff,
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<ExamResult>>, ApiError> {
    helpers::load_managed_exam(&state, &staff, &exam_id).await?;

    let mut results = repositories::results::list_by_exam(state.store(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list results"))?;
    results.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));

    Ok(Json(results))
}

pub(in crate::api::exams) async fn delete_exam_results(
    staff: Staff,
    Path(exam_id): Path<String>,
    Query(params): Query<DeleteResultsQuery>,
    State(state): State<AppState>,
) -> Result<Json<DeletedResponse>, ApiError> {
    helpers::load_managed_exam(&state, &staff, &exam_id).await?;

    let deleted = repositories::results::delete_for_exam(state.store(), &exam_id, params.room())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete results"))?;

    Ok(Json(DeletedResponse { deleted }))
}
