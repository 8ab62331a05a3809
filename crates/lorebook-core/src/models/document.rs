//! Document model

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use uuid::Uuid;

use crate::error::{Error, Result};

static LEGACY_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^doc_[0-9]+_[0-9a-f]{8}$").expect("Invalid regex"));

/// A document identifier: a GUID v4, or the legacy `doc_<epoch-ms>_<8-hex>` form.
///
/// Both forms stay valid forever; documents created by older clients keep
/// their legacy ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentId(String);

impl DocumentId {
    /// Create a new random GUID v4 identifier
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id uses the legacy `doc_<ms>_<hex>` form
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        self.0.starts_with("doc_")
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if is_guid_v4(s) {
            // One spelling per GUID, so every id maps to one remote path.
            Ok(Self(s.to_ascii_lowercase()))
        } else if LEGACY_ID.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::Validation(format!("invalid document id: {s:?}")))
        }
    }
}

impl TryFrom<String> for DocumentId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DocumentId> for String {
    fn from(value: DocumentId) -> Self {
        value.0
    }
}

/// Hyphenated 8-4-4-4-12 GUID with version 4 and the RFC 4122 variant.
fn is_guid_v4(s: &str) -> bool {
    if s.len() != 36 {
        return false;
    }
    let Ok(uuid) = Uuid::try_parse(s) else {
        return false;
    };
    uuid.get_version_num() == 4
        && uuid.get_variant() == uuid::Variant::RFC4122
        && uuid.hyphenated().to_string() == s.to_ascii_lowercase()
}

/// Where a document lives remotely and which revision was last seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRef {
    /// Repository path of the document file
    pub path: String,
    /// Opaque remote revision marker (a git blob sha for GitHub)
    pub revision_token: String,
    /// When the document was last reconciled with the remote (Unix ms)
    pub last_synced_at: i64,
}

/// A stored document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier
    pub id: DocumentId,
    /// Display title
    pub title: String,
    /// Markdown body
    pub content: String,
    /// Lowercase, de-duplicated tags in display order
    pub tags: Vec<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last modification timestamp (Unix ms)
    pub modified_at: i64,
    /// Digest of `content`
    pub checksum: String,
    /// Remote location, present once synced
    pub remote: Option<RemoteRef>,
}

impl Document {
    /// Whether this document has ever been synced
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        self.remote.is_some()
    }

    /// Get first line of the body as a preview, truncated to `max_len` characters
    #[must_use]
    pub fn preview(&self, max_len: usize) -> String {
        self.content
            .lines()
            .find(|line| !line.trim().is_empty())
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }

    /// Convert back into an editable draft keeping the id
    #[must_use]
    pub fn to_draft(&self) -> DocumentDraft {
        DocumentDraft {
            id: Some(self.id.to_string()),
            title: self.title.clone(),
            content: self.content.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Caller-supplied document data, before validation and id assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDraft {
    /// Existing id, if any; assigned on first save otherwise
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DocumentDraft {
    /// Create a draft for a new document
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            content: content.into(),
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Build a draft from loosely-typed document data.
    ///
    /// Rejects a non-string `id`, `title` or `content`, and `tags` that are
    /// not an array of strings. Value-level checks are left to `validate`.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(Error::Validation("document must be an object".into()));
        };

        let id = match object.get("id") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id.clone()),
            Some(_) => return Err(Error::Validation("id must be a string".into())),
        };
        let title = match object.get("title") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(title)) => title.clone(),
            Some(_) => return Err(Error::Validation("title must be a string".into())),
        };
        let content = match object.get("content") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(content)) => content.clone(),
            Some(_) => return Err(Error::Validation("content must be a string".into())),
        };
        let tags = match object.get("tags") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(ToOwned::to_owned).ok_or_else(|| {
                        Error::Validation("tags must contain only strings".into())
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(Error::Validation("tags must be an array".into())),
        };

        Ok(Self {
            id,
            title,
            content,
            tags,
        })
    }
}

impl From<&Document> for DocumentDraft {
    fn from(document: &Document) -> Self {
        document.to_draft()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_id_unique() {
        let id1 = DocumentId::new();
        let id2 = DocumentId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_document_id_is_guid_v4() {
        let id = DocumentId::new();
        let uuid = Uuid::parse_str(id.as_str()).unwrap();
        assert_eq!(uuid.get_version_num(), 4);
        assert_eq!(id.as_str().len(), 36);
        assert!(!id.is_legacy());
    }

    #[test]
    fn test_document_id_parse() {
        let id = DocumentId::new();
        let parsed: DocumentId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_upper_case_guid_is_stored_lower_case() {
        let lower = "3f2b6c1e-9a4d-4e8b-b1c2-7d5e9f0a1b2c";
        let upper: DocumentId = lower.to_ascii_uppercase().parse().unwrap();
        assert_eq!(upper.as_str(), lower);
        assert_eq!(upper, lower.parse::<DocumentId>().unwrap());
        let from_json: DocumentId =
            serde_json::from_value(json!(lower.to_ascii_uppercase())).unwrap();
        assert_eq!(from_json.as_str(), lower);
    }

    #[test]
    fn test_legacy_id_accepted() {
        let id: DocumentId = "doc_1700000000000_a1b2c3d4".parse().unwrap();
        assert!(id.is_legacy());
    }

    #[test]
    fn test_invalid_ids_rejected() {
        for raw in [
            "",
            "d1",
            "doc_abc_a1b2c3d4",
            "doc_1700000000000_A1B2C3D4",
            "doc_1700000000000_a1b2c3",
            // version 1 uuid
            "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
            "not-a-uuid-at-all-not-a-uuid-at-all",
        ] {
            assert!(raw.parse::<DocumentId>().is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_document_id_serde_validates() {
        let ok: DocumentId = serde_json::from_value(json!("doc_1_0123abcd")).unwrap();
        assert_eq!(ok.as_str(), "doc_1_0123abcd");
        assert!(serde_json::from_value::<DocumentId>(json!("nope")).is_err());
    }

    #[test]
    fn test_draft_from_value() {
        let draft = DocumentDraft::from_value(&json!({
            "title": "Dragon Quest",
            "content": "# Dragons",
            "tags": ["fantasy"]
        }))
        .unwrap();
        assert_eq!(draft.id, None);
        assert_eq!(draft.title, "Dragon Quest");
        assert_eq!(draft.tags, vec!["fantasy"]);
    }

    #[test]
    fn test_draft_from_value_rejects_non_string_content() {
        let err = DocumentDraft::from_value(&json!({"title": "t", "content": 42})).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_draft_from_value_rejects_mixed_tags() {
        let err =
            DocumentDraft::from_value(&json!({"title": "t", "tags": ["a", 1]})).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = DocumentDraft::from_value(&json!({"title": "t", "tags": "a"})).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_preview_skips_blank_lines() {
        let document = Document {
            id: DocumentId::new(),
            title: "t".into(),
            content: "\n\nFirst line\nSecond".into(),
            tags: vec![],
            created_at: 0,
            modified_at: 0,
            checksum: "00000000".into(),
            remote: None,
        };
        assert_eq!(document.preview(50), "First line");
        assert_eq!(document.preview(5), "First");
    }
}
