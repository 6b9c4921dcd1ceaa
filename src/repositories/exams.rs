use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, watch};

use crate::db::models::{Exam, Question};
use crate::db::store::{DocumentStore, StoreError};
use crate::db::types::{ChangeKind, Collection};
use crate::repositories::results;
use crate::services::exam_codes::sanitize_code;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateExam {
    pub(crate) teacher_id: String,
    pub(crate) subject: String,
    pub(crate) title: String,
    pub(crate) questions: Vec<Question>,
    pub(crate) total_questions: u32,
    pub(crate) time_limit: u32,
    pub(crate) min_submit_time: u32,
    pub(crate) is_active: bool,
    pub(crate) exam_code: String,
    pub(crate) require_fullscreen: bool,
    pub(crate) restricted_room: Option<String>,
    pub(crate) restricted_grade: Option<String>,
    pub(crate) school_name: Option<String>,
}

/// Partial exam update; `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct UpdateExam {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) questions: Option<Vec<Question>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) total_questions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) time_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) min_submit_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) exam_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) require_fullscreen: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) restricted_room: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) restricted_grade: Option<Option<String>>,
}

pub(crate) async fn find_by_id(
    store: &dyn DocumentStore,
    id: &str,
) -> Result<Option<Exam>, StoreError> {
    match store.get(Collection::Exams, id).await? {
        Some(doc) => Ok(Some(doc.decode()?)),
        None => Ok(None),
    }
}

pub(crate) async fn list(store: &dyn DocumentStore) -> Result<Vec<Exam>, StoreError> {
    store.fetch_all(Collection::Exams).await?.iter().map(|doc| doc.decode()).collect()
}

pub(crate) async fn list_by_teacher(
    store: &dyn DocumentStore,
    teacher_id: &str,
) -> Result<Vec<Exam>, StoreError> {
    Ok(list(store).await?.into_iter().filter(|exam| exam.teacher_id == teacher_id).collect())
}

/// Finds an exam by code, comparing sanitized forms on both sides.
pub(crate) async fn find_by_code(
    store: &dyn DocumentStore,
    code: &str,
) -> Result<Option<Exam>, StoreError> {
    let wanted = sanitize_code(code);
    if wanted.is_empty() {
        return Ok(None);
    }

    Ok(list(store).await?.into_iter().find(|exam| sanitize_code(&exam.exam_code) == wanted))
}

pub(crate) async fn create(
    store: &dyn DocumentStore,
    exam: CreateExam,
) -> Result<Exam, StoreError> {
    let body = serde_json::to_value(&exam).map_err(StoreError::Encode)?;
    let doc = store.add(Collection::Exams, body).await?;
    doc.decode()
}

pub(crate) async fn update(
    store: &dyn DocumentStore,
    id: &str,
    changes: UpdateExam,
) -> Result<Exam, StoreError> {
    let patch = serde_json::to_value(&changes).map_err(StoreError::Encode)?;
    let doc = store.update(Collection::Exams, id, patch).await?;
    doc.decode()
}

pub(crate) async fn set_active(
    store: &dyn DocumentStore,
    id: &str,
    is_active: bool,
) -> Result<Exam, StoreError> {
    let mut patch = Map::new();
    patch.insert("is_active".to_string(), Value::Bool(is_active));
    let doc = store.update(Collection::Exams, id, Value::Object(patch)).await?;
    doc.decode()
}

/// Removes the exam together with every result recorded against it. Returns
/// how many results were removed.
pub(crate) async fn delete(store: &dyn DocumentStore, id: &str) -> Result<usize, StoreError> {
    let removed = results::delete_for_exam(store, id, None).await?;
    store.delete(Collection::Exams, id).await?;
    Ok(removed)
}

/// Live view of an exam's `is_active` flag fed from the store's change feed.
/// `initial` is what the caller last read; the feed subscribes first and then
/// re-reads the exam, so a toggle landing in between still reaches the watch.
/// The feed task ends when the exam is removed or every receiver is dropped.
pub(crate) fn observe_active(
    store: Arc<dyn DocumentStore>,
    exam_id: &str,
    initial: bool,
) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(initial);
    let mut feed = store.subscribe(Collection::Exams);
    let exam_id = exam_id.to_string();

    tokio::spawn(async move {
        if !reread_active(store.as_ref(), &exam_id, &tx).await {
            tracing::debug!(exam_id = %exam_id, "Exam gone before activity feed started");
            return;
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                event = feed.recv() => match event {
                    Ok(event) if event.id == exam_id => {
                        let active = match event.kind {
                            ChangeKind::Removed => false,
                            ChangeKind::Added | ChangeKind::Modified => {
                                event.data.as_ref().and_then(active_flag).unwrap_or(false)
                            }
                        };
                        publish_active(&tx, active);
                        if event.kind == ChangeKind::Removed {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            exam_id = %exam_id,
                            skipped,
                            "Exam change feed lagged; re-reading exam"
                        );
                        if !reread_active(store.as_ref(), &exam_id, &tx).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        tracing::debug!(exam_id = %exam_id, "Exam activity feed stopped");
    });

    rx
}

/// Publishes the stored flag. Returns `false` once the exam no longer exists.
async fn reread_active(
    store: &dyn DocumentStore,
    exam_id: &str,
    tx: &watch::Sender<bool>,
) -> bool {
    match store.get(Collection::Exams, exam_id).await {
        Ok(Some(doc)) => {
            publish_active(tx, active_flag(&doc.data).unwrap_or(false));
            true
        }
        Ok(None) => {
            publish_active(tx, false);
            false
        }
        Err(err) => {
            tracing::error!(exam_id = %exam_id, error = %err, "Failed to re-read exam");
            true
        }
    }
}

/// Only a real flip wakes the receivers.
fn publish_active(tx: &watch::Sender<bool>, active: bool) {
    tx.send_if_modified(|current| std::mem::replace(current, active) != active);
}

fn active_flag(data: &Value) -> Option<bool> {
    data.get("is_active").or_else(|| data.get("isActive")).and_then(Value::as_bool)
}
