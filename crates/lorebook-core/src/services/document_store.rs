//! Local document store service shared across clients.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    CheckedListing, Database, DocumentRepository, SqliteDocumentRepository,
    SqliteSyncStateRepository, SyncStateRepository,
};
use crate::models::{Document, DocumentDraft, DocumentId, RemoteRef};
use crate::Result;

/// Thread-safe local document store.
///
/// Every operation holds the connection lock for its whole duration, so
/// concurrent saves of the same id are applied one after the other and the
/// last one wins.
#[derive(Clone)]
pub struct DocumentStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl DocumentStore {
    /// Open a store backed by the database file at `db_path`.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Path of the backing database file, if any.
    pub fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Validate, sanitize and upsert a document.
    pub async fn save(&self, draft: DocumentDraft) -> Result<Document> {
        let db = self.db.lock().await;
        SqliteDocumentRepository::new(db.connection()).save(draft)
    }

    /// Fetch a document by id.
    pub async fn get(&self, id: &DocumentId) -> Result<Option<Document>> {
        let db = self.db.lock().await;
        SqliteDocumentRepository::new(db.connection()).get(id)
    }

    /// All documents, most recently modified first.
    pub async fn get_all(&self) -> Result<Vec<Document>> {
        let db = self.db.lock().await;
        SqliteDocumentRepository::new(db.connection()).list()
    }

    /// All documents, with rows failing checksum verification listed apart.
    pub async fn get_all_checked(&self) -> Result<CheckedListing> {
        let db = self.db.lock().await;
        SqliteDocumentRepository::new(db.connection()).list_checked()
    }

    /// Delete a document. Unknown ids are ignored.
    pub async fn delete(&self, id: &DocumentId) -> Result<()> {
        let db = self.db.lock().await;
        SqliteDocumentRepository::new(db.connection()).delete(id)
    }

    /// Search documents by title, content or tag.
    pub async fn search(&self, query: &str) -> Result<Vec<Document>> {
        let db = self.db.lock().await;
        SqliteDocumentRepository::new(db.connection()).search(query)
    }

    /// Resolve a full id or a unique id prefix.
    pub async fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        SqliteDocumentRepository::new(db.connection()).list_ids_by_prefix(prefix, limit)
    }

    /// Store a downloaded document verbatim.
    pub async fn put_synced(&self, document: &Document) -> Result<()> {
        let db = self.db.lock().await;
        SqliteDocumentRepository::new(db.connection()).put_synced(document)
    }

    /// Record where a document now lives remotely.
    pub async fn mark_synced(&self, id: &DocumentId, remote: &RemoteRef) -> Result<()> {
        let db = self.db.lock().await;
        SqliteDocumentRepository::new(db.connection()).mark_synced(id, remote)
    }

    /// Completion time of the last full sync pass.
    pub async fn last_pass_at(&self) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        SqliteSyncStateRepository::new(db.connection()).last_pass_at()
    }

    /// Persist the completion time of a full sync pass.
    pub async fn set_last_pass_at(&self, timestamp_ms: i64) -> Result<()> {
        let db = self.db.lock().await;
        SqliteSyncStateRepository::new(db.connection()).set_last_pass_at(timestamp_ms)
    }
}
