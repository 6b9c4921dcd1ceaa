pub mod models;
pub mod store;
pub mod types;

use std::sync::Arc;

use crate::db::store::{DocumentStore, MemoryStore};

pub(crate) fn init_store() -> Arc<dyn DocumentStore> {
    let store = MemoryStore::new();
    tracing::info!(collections = store.collection_count(), "In-memory document store ready");
    Arc::new(store)
}
