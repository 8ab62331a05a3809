//! Reconciliation between the local store and the remote repository.

mod classify;
mod engine;
mod merge;
mod queue;
mod report;

pub use classify::{classify, Classification};
pub use engine::SyncEngine;
pub use merge::{merge_documents, provenance_header};
pub use queue::{ChangeQueue, ConflictQueue};
pub use report::{FlushReport, ItemOutcome, ItemStatus, SyncReport};
