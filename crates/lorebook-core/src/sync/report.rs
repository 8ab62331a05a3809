//! Results of sync passes and queue flushes.

use serde::{Deserialize, Serialize};

use super::classify::Classification;
use crate::models::DocumentId;

/// What happened to one document during a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum ItemStatus {
    Unchanged,
    Uploaded,
    Downloaded,
    Conflicted,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub id: DocumentId,
    pub classification: Classification,
    pub status: ItemStatus,
}

/// Aggregate result of a full sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub uploaded: usize,
    pub downloaded: usize,
    pub conflicts: usize,
    pub errors: usize,
    /// Unix ms
    pub started_at: i64,
    /// Unix ms
    pub finished_at: i64,
    pub items: Vec<ItemOutcome>,
}

impl SyncReport {
    pub(crate) fn begin(started_at: i64) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, outcome: ItemOutcome) {
        match outcome.status {
            ItemStatus::Unchanged => {}
            ItemStatus::Uploaded => self.uploaded += 1,
            ItemStatus::Downloaded => self.downloaded += 1,
            ItemStatus::Conflicted => self.conflicts += 1,
            ItemStatus::Failed(_) => self.errors += 1,
        }
        self.items.push(outcome);
    }

    pub(crate) fn finish(&mut self, finished_at: i64) {
        self.finished_at = finished_at;
    }

    /// Whether the pass moved or flagged anything
    pub fn has_changes(&self) -> bool {
        self.uploaded + self.downloaded + self.conflicts > 0
    }

    /// Outcomes that failed, with their error text
    pub fn failures(&self) -> impl Iterator<Item = (&DocumentId, &str)> {
        self.items.iter().filter_map(|item| match &item.status {
            ItemStatus::Failed(error) => Some((&item.id, error.as_str())),
            _ => None,
        })
    }
}

/// Result of flushing the change queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    pub uploaded: usize,
    pub requeued: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConflictKind;

    fn outcome(classification: Classification, status: ItemStatus) -> ItemOutcome {
        ItemOutcome {
            id: DocumentId::new(),
            classification,
            status,
        }
    }

    #[test]
    fn record_folds_counters() {
        let mut report = SyncReport::begin(10);
        report.record(outcome(Classification::InSync, ItemStatus::Unchanged));
        report.record(outcome(Classification::LocalAhead, ItemStatus::Uploaded));
        report.record(outcome(Classification::RemoteAhead, ItemStatus::Downloaded));
        report.record(outcome(
            Classification::Conflicted(ConflictKind::BothModified),
            ItemStatus::Conflicted,
        ));
        report.record(outcome(
            Classification::LocalAhead,
            ItemStatus::Failed("boom".into()),
        ));
        report.finish(20);

        assert_eq!(
            (report.uploaded, report.downloaded, report.conflicts, report.errors),
            (1, 1, 1, 1)
        );
        assert_eq!(report.items.len(), 5);
        assert_eq!(report.failures().map(|(_, e)| e).collect::<Vec<_>>(), vec!["boom"]);
        assert!(report.has_changes());
        assert_eq!(report.finished_at - report.started_at, 10);
    }

    #[test]
    fn report_serializes_for_display() {
        let mut report = SyncReport::begin(0);
        report.record(outcome(
            Classification::Conflicted(ConflictKind::NoSyncMarker),
            ItemStatus::Conflicted,
        ));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["conflicts"], 1);
        assert_eq!(json["items"][0]["classification"]["state"], "conflicted");
        assert_eq!(json["items"][0]["classification"]["kind"], "no_sync_marker");
        assert_eq!(json["items"][0]["status"]["status"], "conflicted");
    }
}
