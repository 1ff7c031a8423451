// Write-ahead journal: one JSON line per committed mutation, fsync'd before the
// mutation becomes visible in the tree.

use crate::namespace_tree::NamespaceTree;
use dfs_lib::{DfsError, DfsPath, DfsResult, Inode, JournalAction, JournalEntry};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

pub const JOURNAL_FILE_NAME: &str = "edits.jsonl";

pub struct Journal {
    path: PathBuf,
    file: File,
    entry_count: usize,
    byte_len: u64,
    last_seq: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    /// Entries already covered by the snapshot.
    pub skipped: usize,
}

impl Journal {
    /// Open (or create) the journal and return every complete entry on disk.
    /// `base_seq` is the last sequence covered by the loaded snapshot; new entries
    /// continue after whichever is larger, the snapshot or the journal tail.
    pub async fn open(path: &Path, base_seq: u64) -> DfsResult<(Self, Vec<JournalEntry>)> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                DfsError::IoError(format!("create dir {} failed: {}", parent.display(), e))
            })?;
        }

        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(DfsError::IoError(format!(
                    "read journal {} failed: {}",
                    path.display(),
                    e
                )))
            }
        };

        let (entries, valid_len) = Self::parse_entries(path, &raw)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| {
                DfsError::IoError(format!("open journal {} failed: {}", path.display(), e))
            })?;

        if valid_len < raw.len() as u64 {
            warn!(
                "journal {}: dropping {} bytes of incomplete tail",
                path.display(),
                raw.len() as u64 - valid_len
            );
            file.set_len(valid_len).await.map_err(|e| {
                DfsError::IoError(format!("truncate journal {} failed: {}", path.display(), e))
            })?;
            file.sync_all().await?;
        }

        let last_seq = entries.last().map(|e| e.seq).unwrap_or(0).max(base_seq);
        info!(
            "journal {} opened: entries={}, last_seq={}",
            path.display(),
            entries.len(),
            last_seq
        );

        let journal = Self {
            path: path.to_path_buf(),
            file,
            entry_count: entries.len(),
            byte_len: valid_len,
            last_seq,
        };
        Ok((journal, entries))
    }

    /// Returns the decoded entries and the length of the newline-terminated prefix.
    fn parse_entries(path: &Path, raw: &[u8]) -> DfsResult<(Vec<JournalEntry>, u64)> {
        let mut entries: Vec<JournalEntry> = Vec::new();
        let mut offset = 0usize;
        let mut line_no = 0usize;

        while offset < raw.len() {
            let end = match raw[offset..].iter().position(|b| *b == b'\n') {
                Some(pos) => offset + pos,
                // unterminated tail: the append never finished
                None => break,
            };
            line_no += 1;
            let line = &raw[offset..end];
            offset = end + 1;

            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            let entry: JournalEntry = serde_json::from_slice(line).map_err(|e| {
                DfsError::Corrupted(format!(
                    "journal {} line {} is malformed: {}",
                    path.display(),
                    line_no,
                    e
                ))
            })?;
            if let Some(prev) = entries.last() {
                if entry.seq <= prev.seq {
                    return Err(DfsError::Corrupted(format!(
                        "journal {} line {}: seq {} does not follow {}",
                        path.display(),
                        line_no,
                        entry.seq,
                        prev.seq
                    )));
                }
            }
            entries.push(entry);
        }

        Ok((entries, offset as u64))
    }

    /// Durably append one entry. On failure the file is cut back to its previous
    /// length so a half-written line never survives.
    pub async fn append(
        &mut self,
        action: JournalAction,
        path: &DfsPath,
        inode: Option<Inode>,
    ) -> DfsResult<JournalEntry> {
        let entry = JournalEntry::new(self.last_seq + 1, action, path, inode);
        let mut line = serde_json::to_vec(&entry)
            .map_err(|e| DfsError::Internal(format!("encode journal entry failed: {}", e)))?;
        line.push(b'\n');

        if let Err(e) = self.write_durable(&line).await {
            error!(
                "journal {}: append {} {} failed: {}",
                self.path.display(),
                action,
                path,
                e
            );
            if let Err(te) = self.file.set_len(self.byte_len).await {
                error!(
                    "journal {}: rollback to {} bytes failed: {}",
                    self.path.display(),
                    self.byte_len,
                    te
                );
            }
            return Err(DfsError::IoError(format!(
                "append journal {} failed: {}",
                self.path.display(),
                e
            )));
        }

        self.byte_len += line.len() as u64;
        self.entry_count += 1;
        self.last_seq = entry.seq;
        debug!("journal append seq={} {} {}", entry.seq, action, path);
        Ok(entry)
    }

    async fn write_durable(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.file.write_all(line).await?;
        self.file.flush().await?;
        self.file.sync_data().await
    }

    /// Drop every entry. Only called after a snapshot covering them is durable.
    pub async fn clear(&mut self) -> DfsResult<()> {
        self.file.set_len(0).await.map_err(|e| {
            DfsError::IoError(format!("clear journal {} failed: {}", self.path.display(), e))
        })?;
        self.file.sync_all().await?;
        info!(
            "journal {} cleared, {} entries folded into snapshot",
            self.path.display(),
            self.entry_count
        );
        self.entry_count = 0;
        self.byte_len = 0;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn reopen_read_only(&mut self) -> DfsResult<()> {
        self.file = OpenOptions::new().read(true).open(&self.path).await?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }
}

/// Re-apply journal entries on top of a tree loaded from the snapshot.
/// Entries at or below `after_seq` are already part of the snapshot.
pub fn replay(
    tree: &mut NamespaceTree,
    entries: &[JournalEntry],
    after_seq: u64,
) -> DfsResult<ReplayStats> {
    let mut stats = ReplayStats::default();
    for entry in entries {
        if entry.seq <= after_seq {
            stats.skipped += 1;
            continue;
        }
        let path = DfsPath::parse(&entry.path).map_err(|e| {
            DfsError::Corrupted(format!("journal seq {} has bad path: {}", entry.seq, e))
        })?;
        tree.apply(entry.action, &path, entry.inode.clone())
            .map_err(|e| {
                DfsError::Corrupted(format!(
                    "replay seq {} {} {} failed: {}",
                    entry.seq, entry.action, entry.path, e
                ))
            })?;
        stats.applied += 1;
    }
    Ok(stats)
}
