//! Sync state repository implementation

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};

const LAST_PASS_AT: &str = "last_pass_at";

/// Trait for persisted sync pass state
pub trait SyncStateRepository {
    /// Completion time of the last full sync pass (Unix ms)
    fn last_pass_at(&self) -> Result<Option<i64>>;

    /// Record the completion time of a full sync pass
    fn set_last_pass_at(&self, timestamp_ms: i64) -> Result<()>;
}

/// `SQLite` implementation of `SyncStateRepository`
pub struct SqliteSyncStateRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSyncStateRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn get_value(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_value(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_state (key, value) VALUES (?, ?)",
            params![key, value],
        )?;
        Ok(())
    }
}

impl SyncStateRepository for SqliteSyncStateRepository<'_> {
    fn last_pass_at(&self) -> Result<Option<i64>> {
        Ok(self
            .get_value(LAST_PASS_AT)?
            .and_then(|value| value.trim().parse().ok()))
    }

    fn set_last_pass_at(&self, timestamp_ms: i64) -> Result<()> {
        self.set_value(LAST_PASS_AT, &timestamp_ms.to_string())
    }
}
