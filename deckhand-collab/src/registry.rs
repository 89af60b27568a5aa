//! Session registry: the process-owned handle onto document state.
//!
//! Nothing is cached here; every `resolve` reads the current stored document,
//! so authorization decisions always see live membership.

use std::sync::Arc;

use uuid::Uuid;

use crate::model::{Document, DocumentSummary};
use crate::store::{DocumentStore, MemoryStore, StoreError};

pub struct SessionRegistry {
    store: Arc<dyn DocumentStore>,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Registry over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Create an empty deck named `name` and return its id.
    pub async fn create(&self, name: &str) -> Result<Uuid, StoreError> {
        let document = Document::new(name);
        self.store.insert(&document).await?;
        log::info!("Created presentation {} ({name:?})", document.id);
        Ok(document.id)
    }

    pub async fn resolve(&self, id: Uuid) -> Result<Document, StoreError> {
        self.store.get(id).await
    }

    /// Overwrite the stored document.
    pub async fn persist(&self, document: &Document) -> Result<(), StoreError> {
        self.store.save(document).await
    }

    pub async fn list(&self) -> Result<Vec<DocumentSummary>, StoreError> {
        self.store.list().await
    }

    /// Clear membership left in storage by a previous process.
    ///
    /// No connection survives a restart, so every stored member and creator
    /// is stale at startup. Returns how many documents were rewritten.
    pub async fn recover(&self) -> Result<usize, StoreError> {
        let summaries = self.list().await?;
        let mut cleared = 0;
        for summary in &summaries {
            let mut document = self.resolve(summary.id).await?;
            if document.members.is_empty() && document.creator.is_none() {
                continue;
            }
            document.members.clear();
            document.creator = None;
            self.persist(&document).await?;
            cleared += 1;
        }
        log::info!(
            "Recovery complete: cleared membership on {cleared}/{} presentations",
            summaries.len()
        );
        Ok(cleared)
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }
}
