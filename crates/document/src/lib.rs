// Subtitle document model

pub mod ass;
pub mod document;
pub mod entry;
pub mod history;

pub use document::Document;
pub use entry::{Dialogue, Entry, InfoEntry, RawEntry, Style};
pub use history::{History, HistoryEntry};

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// File read/write failure.
    Io(String),
    /// Malformed subtitle text.
    Parse { line: usize, message: String },
    NothingToUndo,
    NothingToRedo,
}

impl fmt::Display for DocumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Parse { line, message } => write!(f, "line {line}: {message}"),
            Self::NothingToUndo => write!(f, "nothing to undo"),
            Self::NothingToRedo => write!(f, "nothing to redo"),
        }
    }
}

impl std::error::Error for DocumentError {}
