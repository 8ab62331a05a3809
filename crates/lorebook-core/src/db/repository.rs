//! Document repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::{Error, Result};
use crate::integrity::{self, checksum};
use crate::models::{Document, DocumentDraft, DocumentId, RemoteRef};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

const DOCUMENT_COLUMNS: &str = "id, title, content, tags, created_at, modified_at, checksum, \
     remote_path, remote_revision, remote_synced_at";

/// Every stored document, with rows that failed checksum verification
/// reported beside the readable ones instead of aborting the listing
#[derive(Debug, Default)]
pub struct CheckedListing {
    pub documents: Vec<Document>,
    pub corrupted: Vec<(DocumentId, Error)>,
}

/// Trait for document storage operations
pub trait DocumentRepository {
    /// Validate, sanitize and upsert a draft, assigning an id when absent
    fn save(&self, draft: DocumentDraft) -> Result<Document>;

    /// Get a document by ID
    fn get(&self, id: &DocumentId) -> Result<Option<Document>>;

    /// List all documents, most recently modified first
    fn list(&self) -> Result<Vec<Document>>;

    /// Like `list`, but a corrupted row is reported instead of failing the call
    fn list_checked(&self) -> Result<CheckedListing>;

    /// Delete a document; deleting an unknown id succeeds
    fn delete(&self, id: &DocumentId) -> Result<()>;

    /// Case-insensitive match on title, content or any tag
    fn search(&self, query: &str) -> Result<Vec<Document>>;

    /// Store a document received from the remote exactly as given
    fn put_synced(&self, document: &Document) -> Result<()>;

    /// Record the remote location of a document without touching its content
    fn mark_synced(&self, id: &DocumentId, remote: &RemoteRef) -> Result<()>;

    /// List document ids starting with `prefix`
    fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;
}

/// `SQLite` implementation of `DocumentRepository`
pub struct SqliteDocumentRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteDocumentRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a document from a database row
    fn parse_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
        let id: String = row.get(0)?;
        let id = id
            .parse::<DocumentId>()
            .map_err(|error| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, error.into()))?;
        let tags: String = row.get(3)?;
        let tags = serde_json::from_str::<Vec<String>>(&tags)
            .map_err(|error| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, error.into()))?;

        let remote_path: Option<String> = row.get(7)?;
        let remote_revision: Option<String> = row.get(8)?;
        let remote_synced_at: Option<i64> = row.get(9)?;
        let remote = match (remote_path, remote_revision, remote_synced_at) {
            (Some(path), Some(revision_token), Some(last_synced_at)) => Some(RemoteRef {
                path,
                revision_token,
                last_synced_at,
            }),
            _ => None,
        };

        Ok(Document {
            id,
            title: row.get(1)?,
            content: row.get(2)?,
            tags,
            created_at: row.get(4)?,
            modified_at: row.get(5)?,
            checksum: row.get(6)?,
            remote,
        })
    }

    /// Reject rows whose stored checksum no longer matches their content
    fn verify(document: Document) -> Result<Document> {
        let actual = checksum(&document.content);
        if actual == document.checksum {
            Ok(document)
        } else {
            tracing::warn!("Checksum mismatch for document {}", document.id);
            Err(Error::Integrity {
                id: document.id.to_string(),
                expected: document.checksum,
                actual,
            })
        }
    }

    fn upsert(&self, document: &Document) -> rusqlite::Result<usize> {
        let tags = serde_json::to_string(&document.tags)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(error.into()))?;
        let remote = document.remote.as_ref();

        self.conn.execute(
            "INSERT INTO documents (id, title, content, tags, created_at, modified_at, checksum,
                 remote_path, remote_revision, remote_synced_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 title = excluded.title,
                 content = excluded.content,
                 tags = excluded.tags,
                 created_at = excluded.created_at,
                 modified_at = excluded.modified_at,
                 checksum = excluded.checksum,
                 remote_path = excluded.remote_path,
                 remote_revision = excluded.remote_revision,
                 remote_synced_at = excluded.remote_synced_at",
            params![
                document.id.as_str(),
                document.title,
                document.content,
                tags,
                document.created_at,
                document.modified_at,
                document.checksum,
                remote.map(|r| r.path.as_str()),
                remote.map(|r| r.revision_token.as_str()),
                remote.map(|r| r.last_synced_at),
            ],
        )
    }

    fn get_unverified(&self, id: &DocumentId) -> Result<Option<Document>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"),
                params![id.as_str()],
                Self::parse_document,
            )
            .optional()?)
    }
}

impl DocumentRepository for SqliteDocumentRepository<'_> {
    fn save(&self, draft: DocumentDraft) -> Result<Document> {
        let draft = integrity::prepare(draft)?;
        let id = match draft.id.as_deref() {
            Some(raw) => raw.parse()?,
            None => integrity::generate_id(),
        };
        let now = chrono::Utc::now().timestamp_millis();

        let tx = self.conn.unchecked_transaction()?;
        let existing = self.get_unverified(&id)?;
        let document = Document {
            created_at: existing.as_ref().map_or(now, |doc| doc.created_at),
            remote: existing.and_then(|doc| doc.remote),
            checksum: checksum(&draft.content),
            id,
            title: draft.title,
            content: draft.content,
            tags: draft.tags,
            modified_at: now,
        };
        self.upsert(&document)?;
        tx.commit()?;

        tracing::debug!("Saved document {}", document.id);
        Ok(document)
    }

    fn get(&self, id: &DocumentId) -> Result<Option<Document>> {
        self.get_unverified(id)?.map(Self::verify).transpose()
    }

    fn list(&self) -> Result<Vec<Document>> {
        let listing = self.list_checked()?;
        match listing.corrupted.into_iter().next() {
            Some((_, error)) => Err(error),
            None => Ok(listing.documents),
        }
    }

    fn list_checked(&self) -> Result<CheckedListing> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY modified_at DESC, id ASC"
        ))?;

        let rows = stmt
            .query_map([], Self::parse_document)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut listing = CheckedListing::default();
        for row in rows {
            let id = row.id.clone();
            match Self::verify(row) {
                Ok(document) => listing.documents.push(document),
                Err(error) => listing.corrupted.push((id, error)),
            }
        }
        Ok(listing)
    }

    fn delete(&self, id: &DocumentId) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM documents WHERE id = ?", params![id.as_str()])?;
        if rows == 0 {
            tracing::debug!("Delete of unknown document {} ignored", id);
        }
        Ok(())
    }

    fn search(&self, query: &str) -> Result<Vec<Document>> {
        let needle = query.trim().to_lowercase();
        let documents = self.list()?;
        if needle.is_empty() {
            return Ok(documents);
        }

        Ok(documents
            .into_iter()
            .filter(|doc| {
                doc.title.to_lowercase().contains(&needle)
                    || doc.content.to_lowercase().contains(&needle)
                    || doc.tags.iter().any(|tag| tag.contains(&needle))
            })
            .collect())
    }

    fn put_synced(&self, document: &Document) -> Result<()> {
        integrity::validate(&document.to_draft())?;
        let document = Self::verify(document.clone())?;

        let tx = self.conn.unchecked_transaction()?;
        self.upsert(&document)?;
        tx.commit()?;
        Ok(())
    }

    fn mark_synced(&self, id: &DocumentId, remote: &RemoteRef) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE documents SET remote_path = ?, remote_revision = ?, remote_synced_at = ?
             WHERE id = ?",
            params![
                remote.path,
                remote.revision_token,
                remote.last_synced_at,
                id.as_str()
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn list_ids_by_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let escaped = prefix
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let mut stmt = self.conn.prepare(
            "SELECT id FROM documents WHERE id LIKE ? ESCAPE '\\' ORDER BY modified_at DESC LIMIT ?",
        )?;

        let ids = stmt
            .query_map(params![format!("{escaped}%"), limit as i64], |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_save_assigns_id_and_checksum() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());

        let doc = repo
            .save(DocumentDraft::new("Dragon Quest", "# Dragons").with_tags(["Fantasy"]))
            .unwrap();
        assert!(!doc.id.is_legacy());
        assert_eq!(doc.checksum, checksum("# Dragons"));
        assert_eq!(doc.tags, vec!["fantasy"]);
        assert_eq!(doc.created_at, doc.modified_at);
        assert!(doc.remote.is_none());

        let fetched = repo.get(&doc.id).unwrap().unwrap();
        assert_eq!(fetched, doc);
    }

    #[test]
    fn test_save_is_upsert_preserving_created_at() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());

        let first = repo.save(DocumentDraft::new("Original", "v1")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = repo
            .save(DocumentDraft::new("Renamed", "v2").with_id(first.id.to_string()))
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.modified_at > first.modified_at);
        assert_eq!(repo.list().unwrap().len(), 1);
        assert_eq!(repo.get(&first.id).unwrap().unwrap().content, "v2");
    }

    #[test]
    fn test_save_keeps_remote_reference() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());

        let doc = repo.save(DocumentDraft::new("t", "a")).unwrap();
        let remote = RemoteRef {
            path: format!("documents/{}.md", doc.id),
            revision_token: "abc".into(),
            last_synced_at: 10,
        };
        repo.mark_synced(&doc.id, &remote).unwrap();

        let edited = repo.save(doc.to_draft()).unwrap();
        assert_eq!(edited.remote, Some(remote));
    }

    #[test]
    fn test_guid_spellings_share_one_row() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());
        let lower = "3f2b6c1e-9a4d-4e8b-b1c2-7d5e9f0a1b2c";

        repo.save(DocumentDraft::new("First", "a").with_id(lower.to_ascii_uppercase()))
            .unwrap();
        let second = repo
            .save(DocumentDraft::new("Second", "b").with_id(lower))
            .unwrap();

        assert_eq!(second.id.as_str(), lower);
        assert_eq!(repo.list().unwrap().len(), 1);
    }

    #[test]
    fn test_save_with_legacy_id() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());

        let doc = repo
            .save(DocumentDraft::new("Old", "body").with_id("doc_1700000000000_a1b2c3d4"))
            .unwrap();
        assert_eq!(doc.id.as_str(), "doc_1700000000000_a1b2c3d4");
        assert!(repo.get(&doc.id).unwrap().is_some());
    }

    #[test]
    fn test_validation_happens_before_write() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());

        let err = repo.save(DocumentDraft::new("", "body")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(repo.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_orders_by_modified_desc() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());

        let a = repo.save(DocumentDraft::new("A", "")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = repo.save(DocumentDraft::new("B", "")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        repo.save(a.to_draft()).unwrap();

        let ids = repo
            .list()
            .unwrap()
            .into_iter()
            .map(|doc| doc.id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());

        let doc = repo.save(DocumentDraft::new("To delete", "")).unwrap();
        repo.delete(&doc.id).unwrap();
        repo.delete(&doc.id).unwrap();
        assert!(repo.get(&doc.id).unwrap().is_none());
    }

    #[test]
    fn test_search_matches_title_content_and_tags() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());

        repo.save(DocumentDraft::new("Dragon Quest", "# Dragons"))
            .unwrap();
        repo.save(DocumentDraft::new("Recipes", "Soup with DRAGONfruit"))
            .unwrap();
        repo.save(DocumentDraft::new("Maps", "coastline").with_tags(["dragonlands"]))
            .unwrap();
        repo.save(DocumentDraft::new("Other", "nothing here")).unwrap();

        assert_eq!(repo.search("dragon").unwrap().len(), 3);
        assert_eq!(repo.search("QUEST").unwrap().len(), 1);
        assert_eq!(repo.search("  ").unwrap().len(), 4);
    }

    #[test]
    fn test_corrupted_row_raises_integrity_error() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());

        let doc = repo.save(DocumentDraft::new("t", "original")).unwrap();
        db.connection()
            .execute(
                "UPDATE documents SET content = 'tampered' WHERE id = ?",
                params![doc.id.as_str()],
            )
            .unwrap();

        assert!(matches!(repo.get(&doc.id), Err(Error::Integrity { .. })));
        assert!(matches!(repo.list(), Err(Error::Integrity { .. })));
    }

    #[test]
    fn test_list_checked_reports_corrupted_rows_beside_healthy_ones() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());

        let healthy = repo.save(DocumentDraft::new("ok", "fine")).unwrap();
        let broken = repo.save(DocumentDraft::new("t", "original")).unwrap();
        db.connection()
            .execute(
                "UPDATE documents SET content = 'tampered' WHERE id = ?",
                params![broken.id.as_str()],
            )
            .unwrap();

        let listing = repo.list_checked().unwrap();
        assert_eq!(listing.documents.len(), 1);
        assert_eq!(listing.documents[0].id, healthy.id);
        assert_eq!(listing.corrupted.len(), 1);
        assert_eq!(listing.corrupted[0].0, broken.id);
        assert!(matches!(listing.corrupted[0].1, Error::Integrity { .. }));
        // The row is left as it was.
        let content: String = db
            .connection()
            .query_row(
                "SELECT content FROM documents WHERE id = ?",
                params![broken.id.as_str()],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(content, "tampered");
    }

    #[test]
    fn test_storage_failure_leaves_prior_state() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());

        let doc = repo.save(DocumentDraft::new("t", "before")).unwrap();
        db.connection()
            .execute_batch(
                "CREATE TRIGGER block_updates BEFORE UPDATE ON documents
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let err = repo
            .save(DocumentDraft::new("t", "after").with_id(doc.id.to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
        assert_eq!(repo.get(&doc.id).unwrap().unwrap().content, "before");
    }

    #[test]
    fn test_put_synced_keeps_timestamps() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());

        let document = Document {
            id: "doc_1700000000000_a1b2c3d4".parse().unwrap(),
            title: "Remote".into(),
            content: "from remote".into(),
            tags: vec!["lore".into()],
            created_at: 1_000,
            modified_at: 2_000,
            checksum: checksum("from remote"),
            remote: Some(RemoteRef {
                path: "documents/doc_1700000000000_a1b2c3d4.md".into(),
                revision_token: "sha1".into(),
                last_synced_at: 3_000,
            }),
        };
        repo.put_synced(&document).unwrap();
        assert_eq!(repo.get(&document.id).unwrap().unwrap(), document);
    }

    #[test]
    fn test_put_synced_rejects_bad_checksum() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());

        let document = Document {
            id: DocumentId::new(),
            title: "Remote".into(),
            content: "from remote".into(),
            tags: vec![],
            created_at: 1,
            modified_at: 1,
            checksum: "aaaa1111".into(),
            remote: None,
        };
        assert!(matches!(
            repo.put_synced(&document),
            Err(Error::Integrity { .. })
        ));
        assert!(repo.get(&document.id).unwrap().is_none());
    }

    #[test]
    fn test_mark_synced_unknown_id() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());
        let remote = RemoteRef {
            path: "p".into(),
            revision_token: "r".into(),
            last_synced_at: 1,
        };
        assert!(matches!(
            repo.mark_synced(&DocumentId::new(), &remote),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_list_ids_by_prefix() {
        let db = setup();
        let repo = SqliteDocumentRepository::new(db.connection());

        repo.save(DocumentDraft::new("a", "").with_id("doc_1_0000aaaa"))
            .unwrap();
        repo.save(DocumentDraft::new("b", "").with_id("doc_2_0000bbbb"))
            .unwrap();

        assert_eq!(repo.list_ids_by_prefix("doc_1", 5).unwrap(), vec!["doc_1_0000aaaa"]);
        assert_eq!(repo.list_ids_by_prefix("doc_", 5).unwrap().len(), 2);
    }
}
