//! Bounded record of inbound message ids already handled, per user

use std::collections::{HashMap, HashSet, VecDeque};

/// Default number of message ids remembered per user
pub const DEFAULT_DEDUP_CAPACITY: usize = 100;

/// Insertion-ordered id set; evicts the oldest insertion first
#[derive(Debug, Default)]
struct DedupRecord {
    order: VecDeque<String>,
    ids: HashSet<String>,
}

impl DedupRecord {
    fn insert(&mut self, message_id: &str, capacity: usize) -> bool {
        if self.ids.contains(message_id) {
            return false;
        }
        self.ids.insert(message_id.to_string());
        self.order.push_back(message_id.to_string());
        while self.order.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }
}

/// Per-user FIFO sets of seen message ids
///
/// Not synchronized; the [`SessionStore`](super::SessionStore) owns it under
/// its lock so check-and-mark is atomic per delivery.
#[derive(Debug)]
pub struct DedupGuard {
    capacity: usize,
    records: HashMap<String, DedupRecord>,
}

impl DedupGuard {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: HashMap::new(),
        }
    }

    pub fn seen(&self, user_id: &str, message_id: &str) -> bool {
        self.records
            .get(user_id)
            .is_some_and(|record| record.ids.contains(message_id))
    }

    /// Idempotent insert
    pub fn record(&mut self, user_id: &str, message_id: &str) {
        self.check_and_record(user_id, message_id);
    }

    /// Record `message_id` and report whether it was new
    pub fn check_and_record(&mut self, user_id: &str, message_id: &str) -> bool {
        if self.seen(user_id, message_id) {
            return false;
        }
        self.records
            .entry(user_id.to_string())
            .or_default()
            .insert(message_id, self.capacity)
    }

    /// Drop the whole record of a user
    pub fn forget(&mut self, user_id: &str) {
        self.records.remove(user_id);
    }

    #[cfg(test)]
    pub fn len(&self, user_id: &str) -> usize {
        self.records.get(user_id).map_or(0, |record| record.order.len())
    }
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_CAPACITY)
    }
}
