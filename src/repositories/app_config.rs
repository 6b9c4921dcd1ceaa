use serde_json::json;

use crate::db::models::AppConfig;
use crate::db::store::{DocumentStore, StoreError};
use crate::db::types::Collection;

/// The application config lives in a single well-known document.
pub(crate) const CONFIG_DOCUMENT_ID: &str = "main";

pub(crate) async fn find(store: &dyn DocumentStore) -> Result<Option<AppConfig>, StoreError> {
    match store.get(Collection::AppConfig, CONFIG_DOCUMENT_ID).await? {
        Some(doc) => Ok(Some(doc.decode()?)),
        None => Ok(None),
    }
}

pub(crate) async fn set_admin_password(
    store: &dyn DocumentStore,
    password: &str,
) -> Result<AppConfig, StoreError> {
    let doc = store
        .put(Collection::AppConfig, CONFIG_DOCUMENT_ID, json!({ "admin_password": password }))
        .await?;
    doc.decode()
}
