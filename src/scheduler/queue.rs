//! FIFO work queue with per-key membership.

use std::collections::{HashSet, VecDeque};

use crate::domain::WorkItem;

/// FIFO of pending work items; a key can be queued at most once.
#[derive(Debug, Default)]
pub struct WorkQueue {
    items: VecDeque<WorkItem>,
    keys: HashSet<String>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item. Returns false if its key is already queued.
    pub fn push(&mut self, item: WorkItem) -> bool {
        if !self.keys.insert(item.key.clone()) {
            return false;
        }
        self.items.push_back(item);
        true
    }

    pub fn pop(&mut self) -> Option<WorkItem> {
        let item = self.items.pop_front()?;
        self.keys.remove(&item.key);
        Some(item)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop every queued item, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        self.keys.clear();
        dropped
    }
}
