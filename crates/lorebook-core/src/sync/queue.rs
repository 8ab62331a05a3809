//! Keyed queues owned by the sync engine.

use std::collections::{HashMap, VecDeque};

use crate::models::{ConflictRecord, ConflictSummary, DocumentId};

/// Conflicts awaiting an explicit resolution, one per document
#[derive(Debug, Default)]
pub struct ConflictQueue {
    entries: HashMap<DocumentId, ConflictRecord>,
}

impl ConflictQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the conflict for `record.id`
    pub fn insert(&mut self, record: ConflictRecord) {
        self.entries.insert(record.id.clone(), record);
    }

    pub fn get(&self, id: &DocumentId) -> Option<&ConflictRecord> {
        self.entries.get(id)
    }

    pub fn remove(&mut self, id: &DocumentId) -> Option<ConflictRecord> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &DocumentId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summaries ordered by detection time, then id
    pub fn summaries(&self) -> Vec<ConflictSummary> {
        let mut summaries: Vec<_> = self.entries.values().map(ConflictRecord::summary).collect();
        summaries.sort_by(|a, b| {
            a.detected_at
                .cmp(&b.detected_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        summaries
    }
}

/// Documents changed since the last upload, oldest first.
///
/// Queuing an id that is already pending moves it to the back.
#[derive(Debug, Default)]
pub struct ChangeQueue {
    ids: VecDeque<DocumentId>,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: DocumentId) {
        self.ids.retain(|queued| queued != &id);
        self.ids.push_back(id);
    }

    /// Put back ids that failed to flush, unless they were queued again meanwhile
    pub fn requeue(&mut self, ids: impl IntoIterator<Item = DocumentId>) {
        for (index, id) in ids.into_iter().enumerate() {
            if !self.ids.contains(&id) {
                self.ids.insert(index.min(self.ids.len()), id);
            }
        }
    }

    pub fn drain(&mut self) -> Vec<DocumentId> {
        self.ids.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> Vec<DocumentId> {
        self.ids.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ConflictKind, Document};
    use pretty_assertions::assert_eq;

    fn doc(id: &DocumentId) -> Document {
        Document {
            id: id.clone(),
            title: "t".into(),
            content: String::new(),
            tags: Vec::new(),
            created_at: 0,
            modified_at: 0,
            checksum: "00000000".into(),
            remote: None,
        }
    }

    fn record(id: &DocumentId, detected_at: i64) -> ConflictRecord {
        ConflictRecord {
            id: id.clone(),
            local: doc(id),
            remote: doc(id),
            kind: ConflictKind::BothModified,
            detected_at,
        }
    }

    #[test]
    fn conflict_queue_is_keyed_by_id() {
        let id = DocumentId::new();
        let mut queue = ConflictQueue::new();
        queue.insert(record(&id, 1));
        queue.insert(record(&id, 2));

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(&id).unwrap().detected_at, 2);
        assert!(queue.remove(&id).is_some());
        assert!(queue.is_empty());
    }

    #[test]
    fn summaries_are_ordered_by_detection() {
        let (a, b) = (DocumentId::new(), DocumentId::new());
        let mut queue = ConflictQueue::new();
        queue.insert(record(&a, 20));
        queue.insert(record(&b, 10));

        let ids: Vec<_> = queue.summaries().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[test]
    fn change_queue_collapses_repeats() {
        let (a, b) = (DocumentId::new(), DocumentId::new());
        let mut queue = ChangeQueue::new();
        queue.push(a.clone());
        queue.push(b.clone());
        queue.push(a.clone());

        assert_eq!(queue.ids(), vec![b, a]);
    }

    #[test]
    fn requeue_keeps_newer_entries() {
        let (a, b, c) = (DocumentId::new(), DocumentId::new(), DocumentId::new());
        let mut queue = ChangeQueue::new();
        queue.push(a.clone());
        queue.push(b.clone());
        let drained = queue.drain();
        assert!(queue.is_empty());

        queue.push(c.clone());
        queue.push(b.clone());
        queue.requeue(drained);
        assert_eq!(queue.ids(), vec![a, c, b]);
    }
}
