use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::db::types::{ChangeEvent, ChangeKind, Collection};

const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    seq: u64,
}

impl Document {
    /// Decodes the body into a model, exposing the document id as an `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        self.decode_with(|_| {})
    }

    pub fn decode_with<T: DeserializeOwned>(
        &self,
        extend: impl FnOnce(&mut Map<String, Value>),
    ) -> Result<T, StoreError> {
        let mut body = match &self.data {
            Value::Object(map) => map.clone(),
            _ => return Err(StoreError::NotAnObject),
        };
        body.insert("id".to_string(), Value::String(self.id.clone()));
        extend(&mut body);

        serde_json::from_value(Value::Object(body))
            .map_err(|source| StoreError::Decode { id: self.id.clone(), source })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: &'static str, id: String },
    #[error("documents must be JSON objects")]
    NotAnObject,
    #[error("failed to decode document {id}: {source}")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("document store unavailable: {0}")]
    Unavailable(String),
}

/// The document collections the desk works against: whole-collection reads,
/// single-document writes and a per-collection change feed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch_all(&self, collection: Collection) -> Result<Vec<Document>, StoreError>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError>;

    /// Inserts a new document under a store-assigned id and timestamp.
    async fn add(&self, collection: Collection, data: Value) -> Result<Document, StoreError>;

    /// Creates or replaces the document stored under `id`.
    async fn put(&self, collection: Collection, id: &str, data: Value)
        -> Result<Document, StoreError>;

    /// Merges the top-level fields of `patch` into an existing document.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
    ) -> Result<Document, StoreError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;

    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<ChangeEvent>;
}

#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    collections: RwLock<HashMap<Collection, HashMap<String, Document>>>,
    feeds: HashMap<Collection, broadcast::Sender<ChangeEvent>>,
    seq: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let feeds = Collection::ALL
            .iter()
            .map(|collection| (*collection, broadcast::channel(FEED_CAPACITY).0))
            .collect();
        let collections =
            Collection::ALL.iter().map(|collection| (*collection, HashMap::new())).collect();

        Self {
            inner: Arc::new(MemoryInner {
                collections: RwLock::new(collections),
                feeds,
                seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn collection_count(&self) -> usize {
        self.inner.feeds.len()
    }

    fn publish(&self, collection: Collection, kind: ChangeKind, id: &str, data: Option<Value>) {
        if let Some(feed) = self.inner.feeds.get(&collection) {
            // No subscribers is not an error for a change feed.
            let _ = feed.send(ChangeEvent { collection, kind, id: id.to_string(), data });
        }
    }

    fn next_seq(&self) -> u64 {
        self.inner.seq.fetch_add(1, Ordering::Relaxed)
    }
}

fn into_body(data: Value) -> Result<Map<String, Value>, StoreError> {
    match data {
        Value::Object(mut map) => {
            map.remove("id");
            Ok(map)
        }
        _ => Err(StoreError::NotAnObject),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn fetch_all(&self, collection: Collection) -> Result<Vec<Document>, StoreError> {
        let guard = self.inner.collections.read().await;
        let mut documents: Vec<Document> =
            guard.get(&collection).map(|docs| docs.values().cloned().collect()).unwrap_or_default();
        documents.sort_by_key(|doc| doc.seq);
        Ok(documents)
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        let guard = self.inner.collections.read().await;
        Ok(guard.get(&collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn add(&self, collection: Collection, data: Value) -> Result<Document, StoreError> {
        let body = into_body(data)?;
        let now = OffsetDateTime::now_utc();
        let document = Document {
            id: Uuid::new_v4().to_string(),
            data: Value::Object(body),
            created_at: now,
            updated_at: now,
            seq: self.next_seq(),
        };

        {
            let mut guard = self.inner.collections.write().await;
            guard.entry(collection).or_default().insert(document.id.clone(), document.clone());
        }

        tracing::debug!(collection = collection.as_str(), id = %document.id, "Document added");
        self.publish(collection, ChangeKind::Added, &document.id, Some(document.data.clone()));
        Ok(document)
    }

    async fn put(
        &self,
        collection: Collection,
        id: &str,
        data: Value,
    ) -> Result<Document, StoreError> {
        let body = into_body(data)?;
        let now = OffsetDateTime::now_utc();

        let (document, kind) = {
            let mut guard = self.inner.collections.write().await;
            let docs = guard.entry(collection).or_default();
            match docs.get_mut(id) {
                Some(existing) => {
                    existing.data = Value::Object(body);
                    existing.updated_at = now;
                    (existing.clone(), ChangeKind::Modified)
                }
                None => {
                    let document = Document {
                        id: id.to_string(),
                        data: Value::Object(body),
                        created_at: now,
                        updated_at: now,
                        seq: self.next_seq(),
                    };
                    docs.insert(id.to_string(), document.clone());
                    (document, ChangeKind::Added)
                }
            }
        };

        self.publish(collection, kind, id, Some(document.data.clone()));
        Ok(document)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Value,
    ) -> Result<Document, StoreError> {
        let patch = into_body(patch)?;

        let document = {
            let mut guard = self.inner.collections.write().await;
            let existing = guard
                .get_mut(&collection)
                .and_then(|docs| docs.get_mut(id))
                .ok_or_else(|| StoreError::NotFound {
                    collection: collection.as_str(),
                    id: id.to_string(),
                })?;

            if let Value::Object(body) = &mut existing.data {
                body.extend(patch);
            }
            existing.updated_at = OffsetDateTime::now_utc();
            existing.clone()
        };

        self.publish(collection, ChangeKind::Modified, id, Some(document.data.clone()));
        Ok(document)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let removed = {
            let mut guard = self.inner.collections.write().await;
            guard.get_mut(&collection).and_then(|docs| docs.remove(id))
        };

        if removed.is_none() {
            return Err(StoreError::NotFound {
                collection: collection.as_str(),
                id: id.to_string(),
            });
        }

        tracing::debug!(collection = collection.as_str(), id, "Document removed");
        self.publish(collection, ChangeKind::Removed, id, None);
        Ok(())
    }

    fn subscribe(&self, collection: Collection) -> broadcast::Receiver<ChangeEvent> {
        match self.inner.feeds.get(&collection) {
            Some(feed) => feed.subscribe(),
            // Every collection gets a feed in `new`; a detached receiver never yields.
            None => broadcast::channel(1).1,
        }
    }
}
