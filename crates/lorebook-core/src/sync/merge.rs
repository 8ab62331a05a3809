//! Naive concatenating merge used by [`ResolutionPolicy::Merge`].
//!
//! [`ResolutionPolicy::Merge`]: crate::models::ResolutionPolicy::Merge

use crate::integrity::{checksum, normalize_tags};
use crate::models::Document;
use crate::util::format_timestamp;

/// Provenance line placed between the two bodies
pub fn provenance_header(remote_modified_at: i64) -> String {
    format!(
        "<!-- merged: remote version from {} -->",
        format_timestamp(remote_modified_at)
    )
}

/// Local body, provenance header, then remote body; tags unioned local-first.
///
/// The result keeps the local id, title and creation time, is stamped
/// `modified_at`, and carries the remote reference of `remote` so that the
/// upload overwrites the revision the conflict was detected against.
pub fn merge_documents(local: &Document, remote: &Document, modified_at: i64) -> Document {
    let content = format!(
        "{}\n\n{}\n\n{}",
        local.content,
        provenance_header(remote.modified_at),
        remote.content
    );
    Document {
        id: local.id.clone(),
        title: local.title.clone(),
        checksum: checksum(&content),
        content,
        tags: normalize_tags(local.tags.iter().chain(&remote.tags)),
        created_at: local.created_at.min(remote.created_at),
        modified_at,
        remote: remote.remote.clone().or_else(|| local.remote.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentId, RemoteRef};
    use pretty_assertions::assert_eq;

    fn doc(id: &DocumentId, content: &str, tags: &[&str], modified_at: i64) -> Document {
        Document {
            id: id.clone(),
            title: "Dragon Quest".into(),
            content: content.into(),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            created_at: 1_000,
            modified_at,
            checksum: checksum(content),
            remote: None,
        }
    }

    #[test]
    fn concatenates_with_provenance() {
        let id = DocumentId::new();
        let local = doc(&id, "# Mine", &["fantasy", "lore"], 2_000);
        let mut remote = doc(&id, "# Theirs", &["lore", "dragons"], 1_700_000_000_123);
        remote.remote = Some(RemoteRef {
            path: format!("documents/{id}.md"),
            revision_token: "r2".into(),
            last_synced_at: 5,
        });

        let merged = merge_documents(&local, &remote, 9_999);

        assert_eq!(
            merged.content,
            "# Mine\n\n<!-- merged: remote version from 2023-11-14T22:13:20.123Z -->\n\n# Theirs"
        );
        assert_eq!(merged.tags, vec!["fantasy", "lore", "dragons"]);
        assert_eq!(merged.checksum, checksum(&merged.content));
        assert_eq!(merged.modified_at, 9_999);
        assert_eq!(merged.remote.unwrap().revision_token, "r2");
    }
}
