//! Document persistence.
//!
//! ```text
//! ┌─────────────────┐   get / insert / save / list   ┌──────────────┐
//! │ SessionRegistry │ ─────────────────────────────► │ DocumentStore│
//! └─────────────────┘                                 └──────┬───────┘
//!                                                            │
//!                                          ┌─────────────────┼───────────────┐
//!                                          ▼                                 ▼
//!                                   MemoryStore                      RocksStore
//!                                   (process lifetime)               CF "documents" (bincode + LZ4)
//!                                                                    CF "metadata"  (name, revision)
//! ```
//!
//! Documents are always read and written whole. There is no revision check on
//! `save`: the last successful write wins.

pub mod memory;
pub mod rocks;

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{Document, DocumentSummary};

pub use memory::MemoryStore;
pub use rocks::{DocumentMetadata, RocksStore, StoreConfig};

/// Key-value persistence of whole documents, keyed by document id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load a document.
    async fn get(&self, id: Uuid) -> Result<Document, StoreError>;

    /// Store a new document. Fails if the id is taken.
    async fn insert(&self, document: &Document) -> Result<(), StoreError>;

    /// Overwrite the stored document wholesale.
    async fn save(&self, document: &Document) -> Result<(), StoreError>;

    /// `{id, name}` of every stored document, oldest first.
    async fn list(&self) -> Result<Vec<DocumentSummary>, StoreError>;
}

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(Uuid),

    #[error("document already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("compression error: {0}")]
    Compression(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}
