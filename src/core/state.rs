use std::sync::Arc;

use crate::core::config::Settings;
use crate::db::store::DocumentStore;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn DocumentStore>,
}

impl AppState {
    pub(crate) fn new(settings: Settings, store: Arc<dyn DocumentStore>) -> Self {
        Self { inner: Arc::new(InnerState { settings, store }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &dyn DocumentStore {
        self.inner.store.as_ref()
    }

    pub(crate) fn shared_store(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.inner.store)
    }
}
