//! Undo/Redo history for subtitle documents
//!
//! Each entry stores the whole entry list as it was before a committed change,
//! plus the description shown in the Undo menu ("Undo Trim").

use crate::entry::Entry;

#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub description: String,
    pub entries: Vec<Entry>,
}

#[derive(Clone)]
pub struct History {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    max_entries: usize,
}

impl History {
    pub fn new() -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_entries: 100,
        }
    }

    /// Record the state that existed before a change named `description`
    pub fn record(&mut self, description: impl Into<String>, before: Vec<Entry>) {
        self.undo_stack.push(HistoryEntry {
            description: description.into(),
            entries: before,
        });
        self.redo_stack.clear();

        // Limit history size
        if self.undo_stack.len() > self.max_entries {
            self.undo_stack.remove(0);
        }
    }

    /// Pop the last entry for undo. `current` is parked on the redo stack.
    pub fn undo(&mut self, current: Vec<Entry>) -> Option<HistoryEntry> {
        let entry = self.undo_stack.pop()?;
        self.redo_stack.push(HistoryEntry {
            description: entry.description.clone(),
            entries: current,
        });
        Some(entry)
    }

    /// Pop from redo stack. `current` goes back on the undo stack.
    pub fn redo(&mut self, current: Vec<Entry>) -> Option<HistoryEntry> {
        let entry = self.redo_stack.pop()?;
        self.undo_stack.push(HistoryEntry {
            description: entry.description.clone(),
            entries: current,
        });
        Some(entry)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.last().map(|e| e.description.as_str())
    }

    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Entry, InfoEntry};

    fn info(v: &str) -> Vec<Entry> {
        vec![Entry::Info(InfoEntry { key: "Title".into(), value: v.into() })]
    }

    #[test]
    fn test_undo_redo_cycle() {
        let mut h = History::new();
        h.record("Rename", info("a"));
        assert!(h.can_undo());
        assert_eq!(h.undo_description(), Some("Rename"));

        let undone = h.undo(info("b")).unwrap();
        assert_eq!(undone.entries, info("a"));
        assert!(h.can_redo());

        let redone = h.redo(info("a")).unwrap();
        assert_eq!(redone.entries, info("b"));
        assert!(!h.can_redo());
    }

    #[test]
    fn test_record_clears_redo() {
        let mut h = History::new();
        h.record("one", info("a"));
        h.undo(info("b"));
        h.record("two", info("c"));
        assert!(!h.can_redo());
    }

    #[test]
    fn test_history_is_capped() {
        let mut h = History::new();
        for i in 0..150 {
            h.record(format!("step {}", i), info("x"));
        }
        assert_eq!(h.len(), 100);
    }
}
