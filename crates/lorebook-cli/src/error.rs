use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] lorebook_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No document content provided")]
    EmptyContent,
    #[error("Edited document content cannot be empty")]
    EmptyEditedContent,
    #[error("Document ID cannot be empty")]
    EmptyDocumentId,
    #[error("Search query cannot be empty")]
    EmptySearchQuery,
    #[error("Document not found for id/prefix: {0}")]
    DocumentNotFound(String),
    #[error("{0}")]
    AmbiguousDocumentId(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("No pending conflict for {0}; it may already be in sync")]
    NoConflict(String),
    #[error(
        "Sync is not configured. Set LOREBOOK_GITHUB_OWNER, LOREBOOK_GITHUB_REPO and LOREBOOK_GITHUB_TOKEN to enable `lore sync`."
    )]
    SyncNotConfigured,
}
