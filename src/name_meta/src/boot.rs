use crate::journal::{replay, Journal, ReplayStats};
use crate::namespace_tree::NamespaceTree;
use crate::snapshot::SnapshotStore;
use dfs_lib::DfsResult;
use log::info;
use std::path::Path;
use std::time::Instant;

pub struct RecoveredNamespace {
    pub tree: NamespaceTree,
    pub journal: Journal,
    /// `last_seq` of the loaded snapshot, 0 when starting without one.
    pub snapshot_seq: u64,
    pub replay: ReplayStats,
}

/// Rebuild the namespace before any request is served: load the last snapshot
/// (or start from an empty root), then replay the journal entries recorded
/// after it. Any inconsistency aborts startup.
pub async fn recover(
    snapshot_store: &SnapshotStore,
    journal_path: &Path,
) -> DfsResult<RecoveredNamespace> {
    let start = Instant::now();

    let (mut tree, snapshot_seq) = match snapshot_store.load().await? {
        Some(image) => {
            let seq = image.last_seq;
            (image.into_tree()?, seq)
        }
        None => {
            info!(
                "no snapshot at {}, starting from empty namespace",
                snapshot_store.path().display()
            );
            (NamespaceTree::new(), 0)
        }
    };

    let (journal, entries) = Journal::open(journal_path, snapshot_seq).await?;
    let stats = replay(&mut tree, &entries, snapshot_seq)?;

    info!(
        "namespace recovered: snapshot_seq={}, replayed={}, skipped={}, inodes={}, next_inode_id={}, elapsed={:?}",
        snapshot_seq,
        stats.applied,
        stats.skipped,
        tree.inode_count(),
        tree.next_inode_id(),
        start.elapsed()
    );

    Ok(RecoveredNamespace {
        tree,
        journal,
        snapshot_seq,
        replay: stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::JOURNAL_FILE_NAME;
    use crate::snapshot::{FsImage, SNAPSHOT_FILE_NAME};
    use dfs_lib::{DfsError, DfsPath, Inode, JournalAction};
    use tempfile::TempDir;

    fn p(path: &str) -> DfsPath {
        DfsPath::parse(path).unwrap()
    }

    #[tokio::test]
    async fn test_recover_empty_dir() {
        let tmp = TempDir::new().unwrap();
        let store = SnapshotStore::new(tmp.path().join(SNAPSHOT_FILE_NAME));
        let recovered = recover(&store, &tmp.path().join(JOURNAL_FILE_NAME))
            .await
            .unwrap();
        assert_eq!(recovered.tree.inode_count(), 1);
        assert_eq!(recovered.snapshot_seq, 0);
        assert!(recovered.journal.is_empty());
    }

    #[tokio::test]
    async fn test_recover_journal_without_snapshot() {
        let tmp = TempDir::new().unwrap();
        let journal_path = tmp.path().join(JOURNAL_FILE_NAME);
        let (mut journal, _) = Journal::open(&journal_path, 0).await.unwrap();
        journal
            .append(
                JournalAction::CreateDirectory,
                &p("/a"),
                Some(Inode::new_dir(2, "a", 0)),
            )
            .await
            .unwrap();
        journal
            .append(
                JournalAction::CreateFile,
                &p("/a/f.txt"),
                Some(Inode::new_file(3, "f.txt", 0, Vec::new(), 0)),
            )
            .await
            .unwrap();
        drop(journal);

        let store = SnapshotStore::new(tmp.path().join(SNAPSHOT_FILE_NAME));
        let recovered = recover(&store, &journal_path).await.unwrap();
        assert_eq!(recovered.replay.applied, 2);
        assert_eq!(recovered.tree.lookup_file(&p("/a/f.txt")).unwrap().id, 3);
        assert_eq!(recovered.tree.next_inode_id(), 4);
        assert_eq!(recovered.journal.last_seq(), 2);
    }

    #[tokio::test]
    async fn test_recover_rejects_orphan_entry() {
        let tmp = TempDir::new().unwrap();
        let journal_path = tmp.path().join(JOURNAL_FILE_NAME);
        let (mut journal, _) = Journal::open(&journal_path, 0).await.unwrap();
        journal
            .append(JournalAction::DeleteFile, &p("/ghost.txt"), None)
            .await
            .unwrap();
        drop(journal);

        let store = SnapshotStore::new(tmp.path().join(SNAPSHOT_FILE_NAME));
        let result = recover(&store, &journal_path).await;
        assert!(matches!(result, Err(DfsError::Corrupted(_))));
    }

    #[tokio::test]
    async fn test_recover_skips_entries_in_snapshot() {
        let tmp = TempDir::new().unwrap();
        let journal_path = tmp.path().join(JOURNAL_FILE_NAME);
        let store = SnapshotStore::new(tmp.path().join(SNAPSHOT_FILE_NAME));

        let mut tree = NamespaceTree::new();
        let (mut journal, _) = Journal::open(&journal_path, 0).await.unwrap();
        let inode = Inode::new_dir(tree.alloc_inode_id(), "a", 0);
        journal
            .append(JournalAction::CreateDirectory, &p("/a"), Some(inode.clone()))
            .await
            .unwrap();
        tree.apply(JournalAction::CreateDirectory, &p("/a"), Some(inode))
            .unwrap();

        // snapshot written, crash before the journal was cleared
        store
            .save(&FsImage::capture(&tree, journal.last_seq()))
            .await
            .unwrap();
        drop(journal);

        let recovered = recover(&store, &journal_path).await.unwrap();
        assert_eq!(recovered.snapshot_seq, 1);
        assert_eq!(recovered.replay.skipped, 1);
        assert_eq!(recovered.replay.applied, 0);
        assert!(recovered.tree.find_directory(&p("/a")).is_some());
    }
}
