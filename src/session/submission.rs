use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::models::{Exam, ExamResult, Student, StudentAnswer};
use crate::db::store::{DocumentStore, StoreError};
use crate::repositories::results::{self, CreateResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    /// Student confirmed, or retried after a failed write.
    Manual,
    /// The countdown reached zero.
    Timeout,
    /// The teacher closed the exam mid-attempt.
    ExamClosed,
}

impl SubmitTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Timeout => "timeout",
            Self::ExamClosed => "exam_closed",
        }
    }
}

/// A scored attempt ready to be written. Produced once per successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultDraft {
    pub exam_id: String,
    pub student: Student,
    pub score: u32,
    pub total: u32,
    pub answers: Vec<StudentAnswer>,
    #[serde(skip)]
    pub trigger: SubmitTrigger,
}

/// Counts answers whose original option index matches the answer key.
/// Display order never enters here.
pub fn score_answers(key: &Exam, answers: &[StudentAnswer]) -> u32 {
    answers
        .iter()
        .filter(|answer| {
            key.question(&answer.question_id)
                .is_some_and(|question| question.is_correct(answer.selected_answer_index))
        })
        .count() as u32
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("result store failed: {0}")]
    Store(#[from] StoreError),
    #[error("exam desk unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("exam desk rejected the result ({status}): {detail}")]
    Rejected { status: u16, detail: String },
}

/// One-shot result writer. Implementations must not retry on their own.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn submit_result(&self, draft: ResultDraft) -> Result<ExamResult, SubmitError>;
}

/// Writes results straight into an in-process document store.
#[derive(Clone)]
pub struct StoreResultSink {
    store: Arc<dyn DocumentStore>,
}

impl StoreResultSink {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResultSink for StoreResultSink {
    async fn submit_result(&self, draft: ResultDraft) -> Result<ExamResult, SubmitError> {
        let result = results::create(
            self.store.as_ref(),
            CreateResult {
                exam_id: draft.exam_id,
                student: draft.student,
                score: draft.score,
                total: draft.total,
                answers: draft.answers,
            },
        )
        .await?;

        tracing::info!(
            exam_id = %result.exam_id,
            result_id = %result.id,
            score = result.score,
            total = result.total,
            trigger = draft.trigger.as_str(),
            "Exam result stored"
        );
        Ok(result)
    }
}
