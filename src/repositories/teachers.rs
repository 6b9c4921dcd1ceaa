use serde::Serialize;
use serde_json::{Map, Value};

use crate::db::models::Teacher;
use crate::db::store::{DocumentStore, StoreError};
use crate::db::types::Collection;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateTeacher {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) password: String,
    pub(crate) school_name: Option<String>,
    pub(crate) approved: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub(crate) struct UpdateTeacher {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) school_name: Option<Option<String>>,
}

pub(crate) async fn find_by_id(
    store: &dyn DocumentStore,
    id: &str,
) -> Result<Option<Teacher>, StoreError> {
    match store.get(Collection::Teachers, id).await? {
        Some(doc) => Ok(Some(doc.decode()?)),
        None => Ok(None),
    }
}

/// Email comparison is case-insensitive; stored addresses keep their casing.
pub(crate) async fn find_by_email(
    store: &dyn DocumentStore,
    email: &str,
) -> Result<Option<Teacher>, StoreError> {
    let wanted = email.trim().to_lowercase();
    Ok(list(store).await?.into_iter().find(|teacher| teacher.email.to_lowercase() == wanted))
}

pub(crate) async fn list(store: &dyn DocumentStore) -> Result<Vec<Teacher>, StoreError> {
    store.fetch_all(Collection::Teachers).await?.iter().map(|doc| doc.decode()).collect()
}

pub(crate) async fn create(
    store: &dyn DocumentStore,
    teacher: CreateTeacher,
) -> Result<Teacher, StoreError> {
    let body = serde_json::to_value(&teacher).map_err(StoreError::Encode)?;
    let doc = store.add(Collection::Teachers, body).await?;
    doc.decode()
}

pub(crate) async fn update(
    store: &dyn DocumentStore,
    id: &str,
    changes: UpdateTeacher,
) -> Result<Teacher, StoreError> {
    let patch = serde_json::to_value(&changes).map_err(StoreError::Encode)?;
    let doc = store.update(Collection::Teachers, id, patch).await?;
    doc.decode()
}

pub(crate) async fn set_approved(
    store: &dyn DocumentStore,
    id: &str,
    approved: bool,
) -> Result<Teacher, StoreError> {
    let mut patch = Map::new();
    patch.insert("approved".to_string(), Value::Bool(approved));
    let doc = store.update(Collection::Teachers, id, Value::Object(patch)).await?;
    doc.decode()
}

pub(crate) async fn delete(store: &dyn DocumentStore, id: &str) -> Result<(), StoreError> {
    store.delete(Collection::Teachers, id).await
}
