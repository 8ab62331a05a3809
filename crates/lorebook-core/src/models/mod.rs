//! Data models for Lorebook

mod document;
mod sync_conflict;

pub use document::{Document, DocumentDraft, DocumentId, RemoteRef};
pub use sync_conflict::{ConflictKind, ConflictRecord, ConflictSummary, ResolutionPolicy};
