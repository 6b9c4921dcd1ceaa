use axum::{extract::State, http::StatusCode, Json};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentTeacher;
use crate::api::validation::{validate_exam, validate_payload};
use crate::core::state::AppState;
use crate::db::models::Exam;
use crate::repositories;
use crate::repositories::exams::CreateExam;
use crate::schemas::exam::{ExamCreate, ExamLookupRequest};
use crate::services::exam_access::{self, AccessError};

use super::super::helpers;

pub(in crate::api::exams) async fn create_exam(
    CurrentTeacher(teacher): CurrentTeacher,
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<Exam>), ApiError> {
    validate_payload(&payload)?;

    let exam_code = helpers::fresh_exam_code(&state).await?;
    let create = CreateExam {
        teacher_id: teacher.id.clone(),
        subject: payload.subject.trim().to_string(),
        title: payload.title.trim().to_string(),
        questions: payload.questions.into_iter().map(|q| q.into_question()).collect(),
        total_questions: payload.total_questions,
        time_limit: payload.time_limit,
        min_submit_time: payload.min_submit_time,
        is_active: payload.is_active,
        exam_code,
        require_fullscreen: payload.require_fullscreen,
        restricted_room: helpers::normalize_restriction(payload.restricted_room),
        restricted_grade: helpers::normalize_restriction(payload.restricted_grade),
        school_name: payload.school_name.or_else(|| teacher.school_name.clone()),
    };
    validate_exam(&draft_exam(&create))?;

    let exam = repositories::exams::create(state.store(), create)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to create exam"))?;

    tracing::info!(
        exam_id = %exam.id,
        exam_code = %exam.exam_code,
        teacher_id = %teacher.id,
        "Exam created"
    );
    Ok((StatusCode::CREATED, Json(exam)))
}

/// Student code entry: 404 for an unknown code, 409 while the exam is closed,
/// 403 when the room or grade does not match.
pub(in crate::api::exams) async fn lookup_exam(
    State(state): State<AppState>,
    Json(payload): Json<ExamLookupRequest>,
) -> Result<Json<Exam>, ApiError> {
    let result = lookup(&state, &payload).await;
    let outcome = helpers::lookup_outcome_label(&payload.exam_code, &result);
    metrics::counter!("exam_lookups_total", "outcome" => outcome).increment(1);
    tracing::debug!(exam_code = %payload.exam_code, outcome, "Exam lookup");
    result.map(Json)
}

async fn lookup(state: &AppState, payload: &ExamLookupRequest) -> Result<Exam, ApiError> {
    validate_payload(payload)?;

    let exam = repositories::exams::find_by_code(state.store(), &payload.exam_code)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to look up exam"))?
        .ok_or_else(|| ApiError::NotFound("No exam matches this code".to_string()))?;

    exam_access::admit(&exam, payload.room.as_deref(), payload.grade.as_deref()).map_err(
        |err| match err {
            AccessError::NotFound(_) => ApiError::NotFound("No exam matches this code".to_string()),
            AccessError::NotOpen(_) => ApiError::Conflict("Exam is not open yet".to_string()),
            AccessError::Restricted { field: "room", .. } => {
                ApiError::Forbidden("Exam is limited to another room")
            }
            AccessError::Restricted { .. } => {
                ApiError::Forbidden("Exam is limited to another grade")
            }
        },
    )?;

    Ok(exam)
}

fn draft_exam(create: &CreateExam) -> Exam {
    Exam {
        id: String::new(),
        teacher_id: create.teacher_id.clone(),
        subject: create.subject.clone(),
        title: create.title.clone(),
        questions: create.questions.clone(),
        total_questions: create.total_questions,
        time_limit: create.time_limit,
        min_submit_time: create.min_submit_time,
        is_active: create.is_active,
        exam_code: create.exam_code.clone(),
        require_fullscreen: create.require_fullscreen,
        restricted_room: create.restricted_room.clone(),
        restricted_grade: create.restricted_grade.clone(),
        school_name: create.school_name.clone(),
    }
}
