//! Per-document classification for a sync pass.

use serde::{Deserialize, Serialize};

use crate::models::{ConflictKind, Document};
use crate::remote::RemoteEntry;

/// Relationship between the local and remote copy of one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "kind")]
pub enum Classification {
    InSync,
    LocalAhead,
    RemoteAhead,
    Conflicted(ConflictKind),
}

/// Classify a document present on both sides.
///
/// The sync marker is the document's own `last_synced_at`, or `pass_marker`
/// when the local copy was never synced. A side counts as changed when its
/// modification time is more than `tolerance_ms` past the marker. The remote
/// side also counts as changed when its revision differs from the one
/// recorded at the last sync.
pub fn classify(
    local: &Document,
    remote: &RemoteEntry,
    pass_marker: Option<i64>,
    tolerance_ms: i64,
) -> Classification {
    if local.checksum == remote.checksum {
        return Classification::InSync;
    }

    let recorded = local.remote.as_ref();
    let Some(marker) = recorded.map(|r| r.last_synced_at).or(pass_marker) else {
        return Classification::Conflicted(ConflictKind::NoSyncMarker);
    };
    let threshold = marker.saturating_add(tolerance_ms);

    let local_changed = local.modified_at > threshold;
    let remote_changed = remote.modified_at > threshold
        || recorded.is_some_and(|r| r.revision_token != remote.revision_token);

    match (local_changed, remote_changed) {
        (true, false) => Classification::LocalAhead,
        (false, true) => Classification::RemoteAhead,
        (true, true) => Classification::Conflicted(ConflictKind::BothModified),
        // Differing content inside the tolerance window: the newer copy wins.
        (false, false) => match local.modified_at.cmp(&remote.modified_at) {
            std::cmp::Ordering::Greater => Classification::LocalAhead,
            std::cmp::Ordering::Less => Classification::RemoteAhead,
            std::cmp::Ordering::Equal => {
                Classification::Conflicted(ConflictKind::BothModified)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::checksum;
    use crate::models::{DocumentId, RemoteRef};

    const T0: i64 = 1_700_000_000_000;
    const TOLERANCE: i64 = 1_000;

    fn local(content: &str, modified_at: i64, synced: Option<(i64, &str)>) -> Document {
        let id: DocumentId = "doc_1700000000000_a1b2c3d4".parse().unwrap();
        Document {
            remote: synced.map(|(at, revision)| RemoteRef {
                path: format!("documents/{id}.md"),
                revision_token: revision.to_string(),
                last_synced_at: at,
            }),
            id,
            title: "Doc".into(),
            content: content.into(),
            tags: Vec::new(),
            created_at: T0,
            modified_at,
            checksum: checksum(content),
        }
    }

    fn remote(content: &str, modified_at: i64, revision: &str) -> RemoteEntry {
        RemoteEntry {
            id: "doc_1700000000000_a1b2c3d4".parse().unwrap(),
            title: "Doc".into(),
            path: "documents/doc_1700000000000_a1b2c3d4.md".into(),
            revision_token: revision.into(),
            size: 10,
            modified_at,
            tags: Vec::new(),
            checksum: checksum(content),
        }
    }

    #[test]
    fn equal_checksums_are_in_sync() {
        let result = classify(&local("a", T0 + 50_000, None), &remote("a", T0, "r1"), None, TOLERANCE);
        assert_eq!(result, Classification::InSync);
    }

    #[test]
    fn local_change_only() {
        let result = classify(
            &local("new", T0 + 10_000, Some((T0, "r1"))),
            &remote("old", T0 - 5_000, "r1"),
            None,
            TOLERANCE,
        );
        assert_eq!(result, Classification::LocalAhead);
    }

    #[test]
    fn remote_change_only() {
        let result = classify(
            &local("old", T0 - 5_000, Some((T0, "r1"))),
            &remote("new", T0 + 10_000, "r2"),
            None,
            TOLERANCE,
        );
        assert_eq!(result, Classification::RemoteAhead);
    }

    #[test]
    fn remote_revision_change_counts_even_with_old_timestamp() {
        let result = classify(
            &local("old", T0 - 5_000, Some((T0, "r1"))),
            &remote("new", T0 - 1_000, "r2"),
            None,
            TOLERANCE,
        );
        assert_eq!(result, Classification::RemoteAhead);
    }

    #[test]
    fn both_changed_is_conflict() {
        let result = classify(
            &local("mine", T0 + 10_000, Some((T0, "r1"))),
            &remote("theirs", T0 + 20_000, "r2"),
            None,
            TOLERANCE,
        );
        assert_eq!(result, Classification::Conflicted(ConflictKind::BothModified));
    }

    #[test]
    fn changes_inside_tolerance_fall_back_to_newest() {
        let result = classify(
            &local("mine", T0 + 800, Some((T0, "r1"))),
            &remote("theirs", T0 + 300, "r1"),
            None,
            TOLERANCE,
        );
        assert_eq!(result, Classification::LocalAhead);

        let result = classify(
            &local("mine", T0 + 300, Some((T0, "r1"))),
            &remote("theirs", T0 + 300, "r1"),
            None,
            TOLERANCE,
        );
        assert_eq!(result, Classification::Conflicted(ConflictKind::BothModified));
    }

    #[test]
    fn tolerance_is_configurable() {
        let pair = (
            local("mine", T0 + 800, Some((T0, "r1"))),
            remote("theirs", T0 + 900, "r1"),
        );
        assert_eq!(
            classify(&pair.0, &pair.1, None, 0),
            Classification::Conflicted(ConflictKind::BothModified)
        );
        assert_eq!(
            classify(&pair.0, &pair.1, None, TOLERANCE),
            Classification::RemoteAhead
        );
    }

    #[test]
    fn pass_marker_applies_to_never_synced_documents() {
        let result = classify(
            &local("mine", T0 + 10_000, None),
            &remote("theirs", T0 - 10_000, "r1"),
            Some(T0),
            TOLERANCE,
        );
        assert_eq!(result, Classification::LocalAhead);
    }

    #[test]
    fn no_marker_is_conflict() {
        let result = classify(
            &local("mine", T0, None),
            &remote("theirs", T0 + 10_000, "r1"),
            None,
            TOLERANCE,
        );
        assert_eq!(result, Classification::Conflicted(ConflictKind::NoSyncMarker));
    }
}
