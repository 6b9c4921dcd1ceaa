use serde::Serialize;
use serde_json::Value;

use crate::core::time::format_offset;
use crate::db::models::{ExamResult, Student, StudentAnswer};
use crate::db::store::{Document, DocumentStore, StoreError};
use crate::db::types::Collection;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateResult {
    pub(crate) exam_id: String,
    pub(crate) student: Student,
    pub(crate) score: u32,
    pub(crate) total: u32,
    pub(crate) answers: Vec<StudentAnswer>,
}

/// Results carry the store's creation time as their submission timestamp.
fn decode_result(doc: &Document) -> Result<ExamResult, StoreError> {
    let submitted_at = format_offset(doc.created_at);
    doc.decode_with(|body| {
        body.insert("submitted_at".to_string(), Value::String(submitted_at));
    })
}

pub(crate) async fn create(
    store: &dyn DocumentStore,
    result: CreateResult,
) -> Result<ExamResult, StoreError> {
    let body = serde_json::to_value(&result).map_err(StoreError::Encode)?;
    let doc = store.add(Collection::Results, body).await?;
    metrics::counter!("results_stored_total").increment(1);
    decode_result(&doc)
}

pub(crate) async fn find_by_id(
    store: &dyn DocumentStore,
    id: &str,
) -> Result<Option<ExamResult>, StoreError> {
    match store.get(Collection::Results, id).await? {
        Some(doc) => Ok(Some(decode_result(&doc)?)),
        None => Ok(None),
    }
}

pub(crate) async fn list_by_exam(
    store: &dyn DocumentStore,
    exam_id: &str,
) -> Result<Vec<ExamResult>, StoreError> {
    let mut results = Vec::new();
    for doc in store.fetch_all(Collection::Results).await? {
        if doc.data.get("exam_id").and_then(Value::as_str) == Some(exam_id) {
            results.push(decode_result(&doc)?);
        }
    }
    Ok(results)
}

pub(crate) async fn delete(store: &dyn DocumentStore, id: &str) -> Result<(), StoreError> {
    store.delete(Collection::Results, id).await?;
    metrics::counter!("results_deleted_total").increment(1);
    Ok(())
}

/// Deletes the results of one exam, optionally only those of students in `room`.
pub(crate) async fn delete_for_exam(
    store: &dyn DocumentStore,
    exam_id: &str,
    room: Option<&str>,
) -> Result<usize, StoreError> {
    let targets: Vec<String> = list_by_exam(store, exam_id)
        .await?
        .into_iter()
        .filter(|result| room.map_or(true, |room| result.student.room == room))
        .map(|result| result.id)
        .collect();

    for id in &targets {
        store.delete(Collection::Results, id).await?;
    }

    if !targets.is_empty() {
        metrics::counter!("results_deleted_total").increment(targets.len() as u64);
        tracing::info!(exam_id, room, removed = targets.len(), "Deleted exam results");
    }

    Ok(targets.len())
}
