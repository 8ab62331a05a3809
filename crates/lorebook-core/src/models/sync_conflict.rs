//! Sync conflict model

use serde::{Deserialize, Serialize};

use super::document::{Document, DocumentId};

/// Why a pair of documents could not be reconciled automatically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Both sides changed since the last sync marker
    BothModified,
    /// The copies differ and there is no sync marker to compare against
    NoSyncMarker,
}

/// A detected conflict, held in memory until explicitly resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    /// Document involved in the conflict
    pub id: DocumentId,
    /// Local copy at detection time
    pub local: Document,
    /// Remote copy at detection time, with its remote reference attached
    pub remote: Document,
    pub kind: ConflictKind,
    /// Detection timestamp (Unix ms)
    pub detected_at: i64,
}

impl ConflictRecord {
    #[must_use]
    pub fn summary(&self) -> ConflictSummary {
        ConflictSummary {
            id: self.id.clone(),
            title: self.local.title.clone(),
            kind: self.kind,
            local_checksum: self.local.checksum.clone(),
            remote_checksum: self.remote.checksum.clone(),
            local_modified_at: self.local.modified_at,
            remote_modified_at: self.remote.modified_at,
            detected_at: self.detected_at,
        }
    }
}

/// Lightweight view of a pending conflict for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub id: DocumentId,
    pub title: String,
    pub kind: ConflictKind,
    pub local_checksum: String,
    pub remote_checksum: String,
    pub local_modified_at: i64,
    pub remote_modified_at: i64,
    pub detected_at: i64,
}

/// How to settle a pending conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Upload the local copy over the remote one
    TakeLocal,
    /// Replace the local copy with the remote one
    TakeRemote,
    /// Concatenate both bodies and upload the result
    Merge,
}
