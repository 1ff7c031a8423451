use crate::{unix_timestamp_ms, DfsPath, Inode};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalAction {
    CreateFile,
    DeleteFile,
    CreateDirectory,
    DeleteDirectory,
}

impl JournalAction {
    pub fn is_create(&self) -> bool {
        matches!(self, JournalAction::CreateFile | JournalAction::CreateDirectory)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JournalAction::CreateFile => "CREATE_FILE",
            JournalAction::DeleteFile => "DELETE_FILE",
            JournalAction::CreateDirectory => "CREATE_DIRECTORY",
            JournalAction::DeleteDirectory => "DELETE_DIRECTORY",
        }
    }
}

impl fmt::Display for JournalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one committed namespace mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Strictly increasing across checkpoints and restarts.
    pub seq: u64,
    /// unix millis
    pub timestamp: u64,
    pub action: JournalAction,
    pub path: String,
    /// The created inode for CREATE_* actions, `None` for deletions.
    #[serde(default)]
    pub inode: Option<Inode>,
}

impl JournalEntry {
    pub fn new(seq: u64, action: JournalAction, path: &DfsPath, inode: Option<Inode>) -> Self {
        Self {
            seq,
            timestamp: unix_timestamp_ms(),
            action,
            path: path.as_str().to_string(),
            inode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_tags_on_the_wire() {
        let path = DfsPath::parse("/a").unwrap();
        let entry = JournalEntry::new(7, JournalAction::DeleteDirectory, &path, None);
        let line = serde_json::to_string(&entry).unwrap();
        assert!(line.contains("\"DELETE_DIRECTORY\""));

        let parsed: JournalEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, entry);
        assert!(!parsed.action.is_create());
    }
}
