//! lorebook-core - Core library for Lorebook
//!
//! A local-first document store that mirrors markdown documents into a Git
//! repository. This crate holds the document model, the `SQLite` local store,
//! the remote repository adapter and the sync engine used by every Lorebook
//! interface.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod integrity;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Document, DocumentDraft, DocumentId};
