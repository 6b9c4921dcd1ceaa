use axum::{
    extract::{Path, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::guards::Staff;
use crate::api::validation::{validate_exam, validate_payload};
use crate::core::state::AppState;
use crate::db::models::Exam;
use crate::repositories;
use crate::repositories::exams::UpdateExam;
use crate::schemas::exam::{ExamActivation, ExamStatusResponse, ExamUpdate};
use crate::schemas::DeletedResponse;

use super::super::helpers;

/// Served to the exam page; includes the answer key because scoring runs there.
pub(in crate::api::exams) async fn get_exam(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Exam>, ApiError> {
    Ok(Json(helpers::load_exam(&state, &exam_id).await?))
}

pub(in crate::api::exams) async fn exam_status(
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<ExamStatusResponse>, ApiError> {
    let exam = helpers::load_exam(&state, &exam_id).await?;
    Ok(Json(ExamStatusResponse::from(&exam)))
}

pub(in crate::api::exams) async fn update_exam(
    staff: Staff,
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ExamUpdate>,
) -> Result<Json<Exam>, ApiError> {
    validate_payload(&payload)?;
    let exam = helpers::load_managed_exam(&state, &staff, &exam_id).await?;

    let changes = UpdateExam {
        subject: payload.subject.map(|subject| subject.trim().to_string()),
        title: payload.title.map(|title| title.trim().to_string()),
        questions: payload
            .questions
            .map(|questions| questions.into_iter().map(|q| q.into_question()).collect()),
        total_questions: payload.total_questions,
        time_limit: payload.time_limit,
        min_submit_time: payload.min_submit_time,
        exam_code: None,
        require_fullscreen: payload.require_fullscreen,
        restricted_room: payload.restricted_room.map(helpers::normalize_restriction),
        restricted_grade: payload.restricted_grade.map(helpers::normalize_restriction),
    };
    validate_exam(&merged(exam, &changes))?;

    let updated = repositories::exams::update(state.store(), &exam_id, changes)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update exam"))?;

    tracing::info!(exam_id = %updated.id, "Exam updated");
    Ok(Json(updated))
}

pub(in crate::api::exams) async fn set_activation(
    staff: Staff,
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<ExamActivation>,
) -> Result<Json<ExamStatusResponse>, ApiError> {
    helpers::load_managed_exam(&state, &staff, &exam_id).await?;

    let exam = repositories::exams::set_active(state.store(), &exam_id, payload.is_active)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to change exam activation"))?;

    tracing::info!(exam_id = %exam.id, is_active = exam.is_active, "Exam activation changed");
    Ok(Json(ExamStatusResponse::from(&exam)))
}

pub(in crate::api::exams) async fn delete_exam(
    staff: Staff,
    Path(exam_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DeletedResponse>, ApiError> {
    helpers::load_managed_exam(&state, &staff, &exam_id).await?;

    let deleted = repositories::exams::delete(state.store(), &exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete exam"))?;

    tracing::info!(exam_id = %exam_id, results_removed = deleted, "Exam deleted");
    Ok(Json(DeletedResponse { deleted }))
}

/// The exam as it would look once `changes` are applied.
fn merged(mut exam: Exam, changes: &UpdateExam) -> Exam {
    if let Some(subject) = &changes.subject {
        exam.subject = subject.clone();
    }
    if let Some(title) = &changes.title {
        exam.title = title.clone();
    }
    if let Some(questions) = &changes.questions {
        exam.questions = questions.clone();
    }
    if let Some(total) = changes.total_questions {
        exam.total_questions = total;
    }
    if let Some(time_limit) = changes.time_limit {
        exam.time_limit = time_limit;
    }
    if let Some(min_submit_time) = changes.min_submit_time {
        exam.min_submit_time = min_submit_time;
    }
    if let Some(require_fullscreen) = changes.require_fullscreen {
        exam.require_fullscreen = require_fullscreen;
    }
    if let Some(room) = &changes.restricted_room {
        exam.restricted_room = room.clone();
    }
    if let Some(grade) = &changes.restricted_grade {
        exam.restricted_grade = grade.clone();
    }
    exam
}
