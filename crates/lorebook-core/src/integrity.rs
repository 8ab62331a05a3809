//! Identity and integrity helpers: ids, checksums, validation and sanitization.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::{DocumentDraft, DocumentId};

/// Maximum title length, in characters
pub const MAX_TITLE_LEN: usize = 200;

/// Checksum of empty content
pub const EMPTY_CHECKSUM: &str = "00000000";

static SCRIPT_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|iframe|object|embed)\b[^>]*>.*?</(script|iframe|object|embed)\s*>")
        .expect("Invalid regex")
});
static SCRIPT_OPEN_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(script|iframe|object|embed)\b[^>]*>").expect("Invalid regex")
});
static HTML_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[a-zA-Z][^>]*>").expect("Invalid regex"));
static EVENT_HANDLERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("Invalid regex")
});
static JAVASCRIPT_URLS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(\]\(\s*|(?:href|src|action)\s*=\s*["']?\s*)javascript\s*:"#)
        .expect("Invalid regex")
});

/// Generate a fresh GUID v4 document id
#[must_use]
pub fn generate_id() -> DocumentId {
    DocumentId::new()
}

/// Short digest of `content` used for change detection.
///
/// First four bytes of the SHA-256 of the UTF-8 content, as lowercase hex.
/// Empty content always yields [`EMPTY_CHECKSUM`].
#[must_use]
pub fn checksum(content: &str) -> String {
    if content.is_empty() {
        return EMPTY_CHECKSUM.to_string();
    }

    let digest = Sha256::digest(content.as_bytes());
    digest[..4].iter().fold(String::with_capacity(8), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

/// Whether `value` looks like a checksum produced by [`checksum`]
#[must_use]
pub fn is_checksum(value: &str) -> bool {
    value.len() == 8
        && value
            .chars()
            .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch))
}

/// Check a draft before it is persisted.
pub fn validate(draft: &DocumentDraft) -> Result<()> {
    if let Some(id) = draft.id.as_deref() {
        id.parse::<DocumentId>()?;
    }

    if draft.title.trim().is_empty() {
        return Err(Error::Validation("title is required".into()));
    }
    let title_len = draft.title.chars().count();
    if title_len > MAX_TITLE_LEN {
        return Err(Error::Validation(format!(
            "title is {title_len} characters; the maximum is {MAX_TITLE_LEN}"
        )));
    }

    if draft.tags.iter().any(|tag| tag.trim().is_empty()) {
        return Err(Error::Validation("tags must not be empty".into()));
    }

    Ok(())
}

/// Strip script-like markup from `title` and `content`.
#[must_use]
pub fn sanitize(mut draft: DocumentDraft) -> DocumentDraft {
    draft.title = sanitize_text(&draft.title);
    draft.content = sanitize_text(&draft.content);
    draft
}

fn sanitize_text(input: &str) -> String {
    let text = SCRIPT_BLOCKS.replace_all(input, "");
    let text = SCRIPT_OPEN_TAGS.replace_all(&text, "");
    // Event handlers only count inside markup; prose like "only = 1" stays.
    let text = HTML_TAGS.replace_all(&text, |caps: &regex::Captures<'_>| {
        EVENT_HANDLERS.replace_all(&caps[0], "").into_owned()
    });
    JAVASCRIPT_URLS.replace_all(&text, "$1").into_owned()
}

/// Trim, lowercase and de-duplicate tags, keeping first-seen order.
#[must_use]
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|tag| tag.as_ref().trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

/// Validate, sanitize and normalize a draft in one step.
pub fn prepare(draft: DocumentDraft) -> Result<DocumentDraft> {
    validate(&draft)?;
    let mut draft = sanitize(draft);
    if draft.title.trim().is_empty() {
        return Err(Error::Validation("title is empty after sanitization".into()));
    }
    draft.tags = normalize_tags(&draft.tags);
    Ok(draft)
}
