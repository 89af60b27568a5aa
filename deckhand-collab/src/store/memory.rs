//! In-process document store.
//!
//! Lives as long as the owning process; used for tests and ephemeral servers.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DocumentStore, StoreError};
use crate::model::{Document, DocumentSummary};

#[derive(Default)]
struct Inner {
    documents: HashMap<Uuid, Document>,
    /// Insertion order for listing.
    order: Vec<Uuid>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Document, StoreError> {
        self.inner
            .read()
            .await
            .documents
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn insert(&self, document: &Document) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.documents.contains_key(&document.id) {
            return Err(StoreError::AlreadyExists(document.id));
        }
        inner.order.push(document.id);
        inner.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn save(&self, document: &Document) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner
            .documents
            .insert(document.id, document.clone())
            .is_none()
        {
            inner.order.push(document.id);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<DocumentSummary>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.documents.get(id))
            .map(Document::summary)
            .collect())
    }
}
