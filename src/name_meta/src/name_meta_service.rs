use crate::block_placement::BlockPlacement;
use crate::boot::recover;
use crate::checkpoint::{CheckpointExecutor, CheckpointPolicy};
use crate::config::NameMetaConfig;
use crate::journal::Journal;
use crate::namespace_tree::{Directory, NamespaceTree};
use crate::node_registry::NodeRegistry;
use crate::snapshot::{FsImage, SnapshotStore};
use async_trait::async_trait;
use dfs_lib::{
    unix_timestamp_ms, BlockAssignment, DfsError, DfsPath, DfsResult, Inode, JournalAction,
};
use log::{debug, error, info};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Everything guarded by the namespace lock. Journal append, tree update and
/// checkpoint all happen under the same write guard.
struct NamespaceState {
    tree: NamespaceTree,
    journal: Journal,
    policy: CheckpointPolicy,
}

pub struct NameMetaService {
    state: RwLock<NamespaceState>,
    snapshot_store: SnapshotStore,
    registry: Arc<NodeRegistry>,
    placement: BlockPlacement,
}

impl NameMetaService {
    /// Recover the namespace from `config.data_dir` and return a service ready
    /// to accept requests.
    pub async fn open(config: NameMetaConfig, registry: Arc<NodeRegistry>) -> DfsResult<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|e| {
                DfsError::IoError(format!(
                    "create data dir {} failed: {}",
                    config.data_dir.display(),
                    e
                ))
            })?;

        let snapshot_store = SnapshotStore::new(config.snapshot_path());
        let recovered = recover(&snapshot_store, &config.journal_path()).await?;
        let policy = CheckpointPolicy::new(
            config.edit_log_size_threshold,
            config.checkpoint_interval(),
        );
        let placement = BlockPlacement::new(
            registry.clone(),
            config.block_size,
            config.replication,
            config.max_blocks_per_file,
        );

        info!(
            "name meta service opened at {}, pending journal entries={}",
            config.data_dir.display(),
            recovered.journal.len()
        );

        Ok(Self {
            state: RwLock::new(NamespaceState {
                tree: recovered.tree,
                journal: recovered.journal,
                policy,
            }),
            snapshot_store,
            registry,
            placement,
        })
    }

    pub fn registry(&self) -> Arc<NodeRegistry> {
        self.registry.clone()
    }

    // ---------- namespace reads ----------

    pub async fn read_file(&self, path: &str) -> DfsResult<Inode> {
        let path = DfsPath::parse(path)?;
        if path.is_root() {
            return Err(DfsError::NotFound("/ is a directory".to_string()));
        }
        let state = self.state.read().await;
        state.tree.lookup_file(&path).cloned()
    }

    /// Children of a directory: files first, then directories, each by name.
    pub async fn read_directory(&self, path: &str) -> DfsResult<Vec<Inode>> {
        let path = DfsPath::parse(path)?;
        let state = self.state.read().await;
        state.tree.list_directory(&path)
    }

    /// Deep copy of the current tree, mainly for inspection and tests.
    pub async fn namespace_root(&self) -> Directory {
        self.state.read().await.tree.root().clone()
    }

    // ---------- namespace mutations ----------

    /// Create an empty file. Needs no storage nodes.
    pub async fn create_file(&self, path: &str) -> DfsResult<Inode> {
        let path = DfsPath::parse(path)?;
        self.commit_create(&path, false, 0, Vec::new()).await
    }

    /// Create a file of `size` bytes and record its block placement in the inode.
    pub async fn create_file_with_size(&self, path: &str, size: u64) -> DfsResult<Inode> {
        let path = DfsPath::parse(path)?;
        {
            let state = self.state.read().await;
            state.tree.check_create(&path)?;
        }
        let blocks = if size > 0 {
            self.placement.allocate(&path, size).await?
        } else {
            Vec::new()
        };
        self.commit_create(&path, false, size, blocks).await
    }

    pub async fn create_directory(&self, path: &str) -> DfsResult<Inode> {
        let path = DfsPath::parse(path)?;
        self.commit_create(&path, true, 0, Vec::new()).await
    }

    pub async fn delete_file(&self, path: &str) -> DfsResult<()> {
        let path = DfsPath::parse(path)?;
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        state.tree.check_delete_file(&path)?;
        self.commit(state, JournalAction::DeleteFile, &path, None)
            .await
    }

    pub async fn delete_directory(&self, path: &str) -> DfsResult<()> {
        let path = DfsPath::parse(path)?;
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        state.tree.check_delete_dir(&path)?;
        self.commit(state, JournalAction::DeleteDirectory, &path, None)
            .await
    }

    async fn commit_create(
        &self,
        path: &DfsPath,
        is_dir: bool,
        size: u64,
        blocks: Vec<BlockAssignment>,
    ) -> DfsResult<Inode> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let name = state.tree.check_create(path)?;
        let id = state.tree.alloc_inode_id();
        let now = unix_timestamp_ms();
        let (action, inode) = if is_dir {
            (JournalAction::CreateDirectory, Inode::new_dir(id, name, now))
        } else {
            (
                JournalAction::CreateFile,
                Inode::new_file(id, name, size, blocks, now),
            )
        };
        self.commit(state, action, path, Some(inode.clone()))
            .await?;
        Ok(inode)
    }

    /// Journal first, then apply. A failed append leaves the tree untouched.
    async fn commit(
        &self,
        state: &mut NamespaceState,
        action: JournalAction,
        path: &DfsPath,
        inode: Option<Inode>,
    ) -> DfsResult<()> {
        let entry = state.journal.append(action, path, inode.clone()).await?;
        if let Err(e) = state.tree.apply(action, path, inode) {
            // validated under the same guard, so this is a bug rather than bad input
            error!(
                "apply journaled seq {} {} {} failed: {}",
                entry.seq, action, path, e
            );
            return Err(DfsError::Internal(format!(
                "apply {} {} failed after journal append: {}",
                action, path, e
            )));
        }
        debug!("committed seq={} {} {}", entry.seq, action, path);

        if state.policy.is_due(state.journal.len(), Instant::now()) {
            // checkpoint failure never fails the mutation
            let _ = self.checkpoint_locked(state).await;
        }
        Ok(())
    }

    // ---------- block placement ----------

    /// Compute a placement for `size` bytes without touching the namespace.
    pub async fn allocate_file_blocks(
        &self,
        path: &str,
        size: u64,
    ) -> DfsResult<Vec<BlockAssignment>> {
        let path = DfsPath::parse(path)?;
        self.placement.allocate(&path, size).await
    }

    // ---------- storage nodes ----------

    pub async fn register_storage_node(&self, address: &str) -> DfsResult<String> {
        self.registry.register(address).await
    }

    /// Accepts heartbeats from unknown senders; they are logged by the registry.
    pub async fn heartbeat(&self, id_or_address: &str) -> DfsResult<()> {
        self.registry.heartbeat(id_or_address).await;
        Ok(())
    }

    // ---------- checkpoint ----------

    /// Force a checkpoint. Returns false when there was nothing to fold.
    pub async fn checkpoint(&self) -> DfsResult<bool> {
        let mut guard = self.state.write().await;
        self.checkpoint_locked(&mut guard).await
    }

    pub async fn checkpoint_if_due(&self) -> DfsResult<bool> {
        let mut guard = self.state.write().await;
        if !guard.policy.is_due(guard.journal.len(), Instant::now()) {
            return Ok(false);
        }
        self.checkpoint_locked(&mut guard).await
    }

    /// Swap the journal handle for a read-only one so every append fails.
    #[cfg(test)]
    pub(crate) async fn break_journal_for_test(&self) -> DfsResult<()> {
        self.state.write().await.journal.reopen_read_only().await
    }

    /// Entries recorded since the last successful checkpoint.
    pub async fn journal_len(&self) -> usize {
        self.state.read().await.journal.len()
    }

    async fn checkpoint_locked(&self, state: &mut NamespaceState) -> DfsResult<bool> {
        if state.journal.is_empty() {
            return Ok(false);
        }

        let start = Instant::now();
        let pending = state.journal.len();
        let last_seq = state.journal.last_seq();
        let image = FsImage::capture(&state.tree, last_seq);

        if let Err(e) = self.snapshot_store.save(&image).await {
            error!(
                "checkpoint failed, keeping {} journal entries: save snapshot: {}",
                pending, e
            );
            state.policy.record_failure(Instant::now());
            return Err(e);
        }
        // the snapshot covers everything up to last_seq from here on, so a
        // failed clear only leaves entries that replay will skip
        if let Err(e) = state.journal.clear().await {
            error!("checkpoint: snapshot saved but clear journal failed: {}", e);
            state.policy.record_failure(Instant::now());
            return Err(e);
        }

        state.policy.record_success(Instant::now());
        info!(
            "checkpoint done: folded {} entries, last_seq={}, elapsed={:?}",
            pending,
            last_seq,
            start.elapsed()
        );
        Ok(true)
    }
}

#[async_trait]
impl CheckpointExecutor for NameMetaService {
    async fn checkpoint_if_due(&self) -> DfsResult<bool> {
        NameMetaService::checkpoint_if_due(self).await
    }
}
