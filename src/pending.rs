//! Staging queue for records not yet sealed into a block.

use std::collections::VecDeque;

use crate::model::{Record, RecordId};

/// Append-only until drained. Callers provide mutual exclusion.
#[derive(Debug, Default)]
pub struct PendingQueue {
    records: VecDeque<Record>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append at the tail. No deduplication, no bound.
    pub fn enqueue(&mut self, record: Record) {
        self.records.push_back(record);
    }

    /// Remove and return every queued record in insertion order.
    pub fn drain_all(&mut self) -> Vec<Record> {
        self.records.drain(..).collect()
    }

    /// Put a batch back ahead of anything queued since it was drained.
    pub fn requeue_front(&mut self, batch: Vec<Record>) {
        for record in batch.into_iter().rev() {
            self.records.push_front(record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drain_returns_everything_in_order_and_empties() {
        let mut queue = PendingQueue::new();
        let a = Record::new(json!({"subject": "S1"}));
        let b = Record::new(json!({"subject": "S2"}));
        queue.enqueue(a.clone());
        queue.enqueue(b.clone());
        assert_eq!(queue.len(), 2);

        let drained = queue.drain_all();
        assert_eq!(drained, vec![a, b]);
        assert!(queue.is_empty());
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn duplicates_are_kept() {
        let mut queue = PendingQueue::new();
        let a = Record::new(json!({"subject": "S1"}));
        queue.enqueue(a.clone());
        queue.enqueue(a.clone());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get(&a.id), Some(&a));
    }

    #[test]
    fn requeued_batch_goes_ahead_of_newer_records() {
        let mut queue = PendingQueue::new();
        let a = Record::new(json!({"subject": "S1"}));
        let b = Record::new(json!({"subject": "S2"}));
        let c = Record::new(json!({"subject": "S3"}));
        queue.enqueue(a.clone());
        queue.enqueue(b.clone());
        let batch = queue.drain_all();
        queue.enqueue(c.clone());
        queue.requeue_front(batch);
        assert_eq!(queue.drain_all(), vec![a, b, c]);
    }
}
