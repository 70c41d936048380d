//! Bounded undo/redo stack over (adjustments, masks) snapshots.

use crate::adjustments::Adjustments;
use crate::masks::Mask;

pub const HISTORY_CAPACITY: usize = 250;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub adjustments: Adjustments,
    pub masks: Vec<Mask>,
}

/// Invariant: once seeded, `index` points at the entry matching the live
/// edit state and `0 <= index < entries.len() <= HISTORY_CAPACITY`.
#[derive(Debug, Default)]
pub struct EditHistory {
    entries: Vec<HistoryEntry>,
    index: usize,
    interacting: bool,
}

impl EditHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears everything and records the freshly loaded state as the floor
    /// of the stack.
    pub fn seed(&mut self, entry: HistoryEntry) {
        self.entries.clear();
        self.entries.push(entry);
        self.index = 0;
        self.interacting = false;
    }

    /// Records a discrete edit. Suppressed while an interaction is open;
    /// a push equal to the current entry is dropped. Any redo tail is
    /// truncated, and on overflow the oldest entries are evicted.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.interacting {
            return;
        }
        if self.entries.get(self.index) == Some(&entry) {
            return;
        }
        if self.entries.is_empty() {
            self.entries.push(entry);
            self.index = 0;
        } else {
            self.entries.truncate(self.index + 1);
            self.entries.push(entry);
            self.index += 1;
        }
        if self.entries.len() > HISTORY_CAPACITY {
            let overflow = self.entries.len() - HISTORY_CAPACITY;
            self.entries.drain(..overflow);
            self.index = self.index.saturating_sub(overflow);
        }
    }

    /// Opens an interaction bracket: pushes between this and
    /// [`end_interaction`](Self::end_interaction) are ignored.
    pub fn begin_interaction(&mut self) {
        self.interacting = true;
    }

    /// Closes the bracket and records the final state once.
    pub fn end_interaction(&mut self, entry: HistoryEntry) {
        self.interacting = false;
        self.push(entry);
    }

    pub fn undo(&mut self) -> Option<&HistoryEntry> {
        if self.index == 0 {
            return None;
        }
        self.index -= 1;
        self.entries.get(self.index)
    }

    pub fn redo(&mut self) -> Option<&HistoryEntry> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        self.entries.get(self.index)
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }
}
