//! Async services shared by every client.

mod document_store;

pub use document_store::DocumentStore;
