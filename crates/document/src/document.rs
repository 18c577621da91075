//! The subtitle document the automation layer works against.

use std::fs;
use std::path::{Path, PathBuf};

use crate::ass;
use crate::entry::{Entry, Style};
use crate::history::History;
use crate::DocumentError;

/// An open subtitle file: ordered entries plus undo history.
#[derive(Clone, Default)]
pub struct Document {
    entries: Vec<Entry>,
    history: History,
    path: Option<PathBuf>,
    modified: bool,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        Ok(Self::from_entries(ass::parse(text)?))
    }

    pub fn load(path: &Path) -> Result<Self, DocumentError> {
        let text = fs::read_to_string(path)
            .map_err(|e| DocumentError::Io(format!("{}: {}", path.display(), e)))?;
        let mut doc = Self::parse(&text)?;
        doc.path = Some(path.to_path_buf());
        log::debug!("loaded {} entries from {}", doc.entries.len(), path.display());
        Ok(doc)
    }

    pub fn save(&mut self, path: &Path) -> Result<(), DocumentError> {
        fs::write(path, self.to_ass_string())
            .map_err(|e| DocumentError::Io(format!("{}: {}", path.display(), e)))?;
        self.path = Some(path.to_path_buf());
        self.modified = false;
        Ok(())
    }

    pub fn to_ass_string(&self) -> String {
        ass::write(&self.entries)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Zero-based indices of all dialogue/comment lines.
    pub fn dialogue_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.as_dialogue().is_some())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn style(&self, name: &str) -> Option<&Style> {
        self.entries
            .iter()
            .filter_map(Entry::as_style)
            .find(|s| s.name == name)
    }

    /// Replace the entry list in one step.
    ///
    /// With `undo_description` set the previous state is recorded as a single
    /// undo step; with `None` the change is applied without history.
    pub fn commit(&mut self, entries: Vec<Entry>, undo_description: Option<&str>) {
        if entries == self.entries {
            return;
        }
        let before = std::mem::replace(&mut self.entries, entries);
        if let Some(description) = undo_description {
            self.history.record(description, before);
        }
        self.modified = true;
    }

    /// Revert the last committed change. Returns its description.
    pub fn undo(&mut self) -> Result<String, DocumentError> {
        let current = self.entries.clone();
        let entry = self.history.undo(current).ok_or(DocumentError::NothingToUndo)?;
        self.entries = entry.entries;
        self.modified = true;
        Ok(entry.description)
    }

    pub fn redo(&mut self) -> Result<String, DocumentError> {
        let current = self.entries.clone();
        let entry = self.history.redo(current).ok_or(DocumentError::NothingToRedo)?;
        self.entries = entry.entries;
        self.modified = true;
        Ok(entry.description)
    }
}
