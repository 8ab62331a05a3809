//! Error types for lorebook-core

use std::time::Duration;

use thiserror::Error;

/// Result type alias using lorebook-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in lorebook-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed document input; never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// Local persistence failure
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Stored checksum does not match the content it describes
    #[error("Integrity error for {id}: expected checksum {expected}, found {actual}")]
    Integrity {
        id: String,
        expected: String,
        actual: String,
    },

    /// Document, file or conflict not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Remote revision token is stale
    #[error("Remote write rejected for {path}: revision changed since last sync")]
    ConflictOnWrite { path: String },

    /// Network failure or timeout talking to the remote
    #[error("Transport error: {0}")]
    Transport(String),

    /// Expired or invalid remote credentials
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Remote rate limit hit
    #[error("Rate limited by remote{}", .retry_after.map(|d| format!(" (retry after {}s)", d.as_secs())).unwrap_or_default())]
    RateLimit { retry_after: Option<Duration> },

    /// Remote not configured
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A full sync pass is already running
    #[error("A sync pass is already in progress")]
    SyncInProgress,

    /// Remote file could not be parsed as a document
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the caller may retry the failed operation as-is.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RateLimit { .. })
    }

    /// Whether this error must abort a whole sync pass instead of a single item.
    pub const fn is_pass_fatal(&self) -> bool {
        matches!(
            self,
            Self::Auth(_) | Self::Configuration(_) | Self::SyncInProgress
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(error: rusqlite::Error) -> Self {
        Self::StorageUnavailable(error.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::StorageUnavailable(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(Error::Transport("timeout".into()).is_retryable());
        assert!(Error::RateLimit { retry_after: None }.is_retryable());
        assert!(!Error::Auth("expired".into()).is_retryable());
        assert!(!Error::Validation("bad".into()).is_retryable());
    }

    #[test]
    fn pass_fatal_errors() {
        assert!(Error::Auth("expired".into()).is_pass_fatal());
        assert!(Error::SyncInProgress.is_pass_fatal());
        assert!(Error::Configuration("missing".into()).is_pass_fatal());
        assert!(!Error::Transport("reset".into()).is_pass_fatal());
        assert!(!Error::NotFound("x".into()).is_pass_fatal());
    }

    #[test]
    fn rate_limit_message_mentions_delay() {
        let error = Error::RateLimit {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert!(error.to_string().contains("30s"));
    }
}
