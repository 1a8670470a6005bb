//! Locally held notification set.

use applyflow_protocol::types::NotificationRecord;

/// Ordered notification set keyed by id, newest first.
///
/// `read` is the only locally mutable field prior to server
/// confirmation; merges never flip a locally read record back to
/// unread.
#[derive(Debug, Default)]
pub struct NotificationInbox {
    records: Vec<NotificationRecord>,
}

impl NotificationInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.records.iter().filter(|r| !r.read).count()
    }

    /// Merges a single pushed record at the front. Returns `true` when
    /// the record is new; a known id updates the stored record in place.
    pub fn push_front(&mut self, record: NotificationRecord) -> bool {
        if let Some(existing) = self.records.iter_mut().find(|r| r.id == record.id) {
            let read = existing.read || record.read;
            *existing = record;
            existing.read = read;
            false
        } else {
            self.records.insert(0, record);
            true
        }
    }

    /// Merges a bulk fetch, preserving the server's order for records
    /// not seen before. Returns the number of newly added records.
    pub fn merge(&mut self, incoming: Vec<NotificationRecord>) -> usize {
        let mut added = 0;
        for record in incoming {
            if let Some(existing) = self.records.iter_mut().find(|r| r.id == record.id) {
                let read = existing.read || record.read;
                *existing = record;
                existing.read = read;
            } else {
                self.records.push(record);
                added += 1;
            }
        }
        added
    }

    /// Marks a notification read. Idempotent: returns `true` only on
    /// the first call for a given id, so the unread count decrements by
    /// exactly one and never goes below zero.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.records.iter_mut().find(|r| r.id == id) {
            Some(record) if !record.read => {
                record.read = true;
                true
            }
            _ => false,
        }
    }
}
