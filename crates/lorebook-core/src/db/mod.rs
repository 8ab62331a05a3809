//! Database layer for Lorebook

mod connection;
mod migrations;
mod repository;
mod sync_state_repository;

pub use connection::Database;
pub use repository::{CheckedListing, DocumentRepository, SqliteDocumentRepository};
pub use sync_state_repository::{SqliteSyncStateRepository, SyncStateRepository};
