//! On-disk format for documents stored in the remote repository.
//!
//! A remote file is a YAML header between `---` lines, one blank line,
//! then the body verbatim:
//!
//! ```text
//! ---
//! id: 3f2b6c1e-9a4d-4e8b-b1c2-7d5e9f0a1b2c
//! title: Dragon Quest
//! created: 2024-03-01T10:00:00.000Z
//! updated: 2024-03-01T10:05:00.000Z
//! tags:
//!   - fantasy
//! checksum: 5a1f0c2e
//! ---
//!
//! # Dragons
//! ```

use std::borrow::Cow;
use std::fmt::Write as _;

use serde_yaml_ng::{Mapping, Value};

use crate::error::{Error, Result};
use crate::integrity::is_checksum;
use crate::models::{Document, DocumentId};
use crate::util::{format_timestamp, parse_timestamp};

const DELIMITER: &str = "---";

/// Header fields of a remote document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHeader {
    pub id: DocumentId,
    pub title: String,
    pub created_at: i64,
    pub modified_at: i64,
    pub tags: Vec<String>,
    pub checksum: String,
}

/// Render a document in the remote file format
pub fn format_document(document: &Document) -> String {
    let mut out = String::with_capacity(document.content.len() + 256);
    out.push_str(DELIMITER);
    out.push('\n');
    push_field(&mut out, "id", document.id.as_str());
    push_field(&mut out, "title", &document.title);
    push_field(&mut out, "created", &format_timestamp(document.created_at));
    push_field(&mut out, "updated", &format_timestamp(document.modified_at));
    if document.tags.is_empty() {
        out.push_str("tags: []\n");
    } else {
        out.push_str("tags:\n");
        for tag in &document.tags {
            let _ = writeln!(out, "  - {}", yaml_scalar(tag));
        }
    }
    push_field(&mut out, "checksum", &document.checksum);
    out.push_str(DELIMITER);
    out.push_str("\n\n");
    out.push_str(&document.content);
    out
}

fn push_field(out: &mut String, key: &str, value: &str) {
    let _ = writeln!(out, "{key}: {}", yaml_scalar(value));
}

/// Emit `value` plain when YAML reads it back as the same string,
/// double-quoted otherwise.
fn yaml_scalar(value: &str) -> Cow<'_, str> {
    let plain = !value.is_empty()
        && !value.contains(['\n', '\r', '\t'])
        && value.trim() == value
        && matches!(
            serde_yaml_ng::from_str::<Value>(value),
            Ok(Value::String(ref parsed)) if parsed == value
        );
    if plain {
        Cow::Borrowed(value)
    } else {
        // JSON string escapes are a subset of YAML double-quoted escapes.
        Cow::Owned(serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\"")))
    }
}

/// Split raw file text into header text and body
fn split(text: &str) -> Result<(&str, &str)> {
    let rest = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
        .ok_or_else(|| Error::MalformedDocument("missing header delimiter".into()))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let next = offset + line.len();
        if line.trim_end_matches(['\n', '\r']) == DELIMITER {
            let header = &rest[..offset];
            let body = &rest[next..];
            let body = body
                .strip_prefix("\r\n")
                .or_else(|| body.strip_prefix('\n'))
                .unwrap_or(body);
            return Ok((header, body));
        }
        offset = next;
    }

    Err(Error::MalformedDocument("unterminated header".into()))
}

/// Parse only the header of a remote file
pub fn parse_header(text: &str) -> Result<DocumentHeader> {
    let (header, _) = split(text)?;
    header_from_yaml(header)
}

/// Parse a remote file into a document with no remote reference attached
pub fn parse_document(text: &str) -> Result<Document> {
    let (header, body) = split(text)?;
    let header = header_from_yaml(header)?;
    Ok(Document {
        id: header.id,
        title: header.title,
        content: body.to_string(),
        tags: header.tags,
        created_at: header.created_at,
        modified_at: header.modified_at,
        checksum: header.checksum,
        remote: None,
    })
}

fn header_from_yaml(header: &str) -> Result<DocumentHeader> {
    let value: Value = serde_yaml_ng::from_str(header)
        .map_err(|error| Error::MalformedDocument(format!("invalid header: {error}")))?;
    let Value::Mapping(fields) = value else {
        return Err(Error::MalformedDocument("header is not a mapping".into()));
    };

    let id = required(&fields, "id")?
        .parse::<DocumentId>()
        .map_err(|error| Error::MalformedDocument(error.to_string()))?;
    let title = required(&fields, "title")?;
    let created_at = timestamp(&fields, "created")?;
    let modified_at = timestamp(&fields, "updated")?;
    let checksum = required(&fields, "checksum")?;
    if !is_checksum(&checksum) {
        return Err(Error::MalformedDocument(format!(
            "header field `checksum` is not a checksum: {checksum}"
        )));
    }
    let tags = match fields.get("tags") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| {
                scalar(item).ok_or_else(|| Error::MalformedDocument("tags must be scalars".into()))
            })
            .collect::<Result<_>>()?,
        Some(_) => return Err(Error::MalformedDocument("tags must be a list".into())),
    };

    Ok(DocumentHeader {
        id,
        title,
        created_at,
        modified_at,
        tags,
        checksum,
    })
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn required(fields: &Mapping, key: &str) -> Result<String> {
    fields
        .get(key)
        .and_then(scalar)
        .ok_or_else(|| Error::MalformedDocument(format!("header field `{key}` is missing")))
}

fn timestamp(fields: &Mapping, key: &str) -> Result<i64> {
    let raw = required(fields, key)?;
    parse_timestamp(&raw).ok_or_else(|| {
        Error::MalformedDocument(format!("header field `{key}` is not a timestamp: {raw}"))
    })
}
