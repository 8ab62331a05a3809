//! Remote document store backed by a Git repository's contents API.

mod format;
mod memory;
mod store;
mod transport;

pub use format::{format_document, parse_document, parse_header, DocumentHeader};
pub use memory::{InjectedFailure, MemoryTransport};
pub use store::{RemoteDocumentStore, RemoteEntry};
pub use transport::{GitHubTransport, Method, RequestOptions, RequestTransport};
