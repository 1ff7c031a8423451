use crate::namespace_tree::{Directory, NamespaceTree};
use dfs_lib::{unix_timestamp_ms, DfsError, DfsPath, DfsResult, Inode, InodeId, JournalAction};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

pub const SNAPSHOT_FILE_NAME: &str = "fsimage.json";
pub const FSIMAGE_FORMAT_VERSION: u32 = 1;

/// One non-root inode plus the directory that holds it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsImageEntry {
    pub parent: String,
    pub inode: Inode,
}

/// Full namespace image. Entries are written parent-before-child so loading is a
/// plain sequence of inserts, and deep trees do not nest in the encoding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsImage {
    pub format_version: u32,
    /// Last journal sequence folded into this image.
    pub last_seq: u64,
    pub next_inode_id: InodeId,
    /// unix millis
    pub saved_at: u64,
    pub root: Inode,
    #[serde(default)]
    pub entries: Vec<FsImageEntry>,
}

impl FsImage {
    pub fn capture(tree: &NamespaceTree, last_seq: u64) -> Self {
        let mut entries = Vec::new();
        let mut stack: Vec<(String, &Directory)> = vec![("/".to_string(), tree.root())];
        while let Some((dir_path, dir)) = stack.pop() {
            for file in dir.child_files.values() {
                entries.push(FsImageEntry {
                    parent: dir_path.clone(),
                    inode: file.clone(),
                });
            }
            for (name, child) in dir.child_dirs.iter() {
                entries.push(FsImageEntry {
                    parent: dir_path.clone(),
                    inode: child.inode.clone(),
                });
                let child_path = if dir_path == "/" {
                    format!("/{}", name)
                } else {
                    format!("{}/{}", dir_path, name)
                };
                stack.push((child_path, child));
            }
        }

        Self {
            format_version: FSIMAGE_FORMAT_VERSION,
            last_seq,
            next_inode_id: tree.next_inode_id(),
            saved_at: unix_timestamp_ms(),
            root: tree.root().inode.clone(),
            entries,
        }
    }

    pub fn into_tree(self) -> DfsResult<NamespaceTree> {
        if self.format_version != FSIMAGE_FORMAT_VERSION {
            return Err(DfsError::Corrupted(format!(
                "unsupported fsimage format version {}",
                self.format_version
            )));
        }

        let mut tree = NamespaceTree::from_root(Directory::new(self.root), self.next_inode_id)?;
        for entry in self.entries {
            let path = DfsPath::parse(&format!("{}/{}", entry.parent, entry.inode.name))
                .map_err(|e| DfsError::Corrupted(format!("fsimage bad entry path: {}", e)))?;
            let action = if entry.inode.is_dir {
                JournalAction::CreateDirectory
            } else {
                JournalAction::CreateFile
            };
            tree.apply(action, &path, Some(entry.inode))
                .map_err(|e| DfsError::Corrupted(format!("fsimage entry {} invalid: {}", path, e)))?;
        }
        Ok(tree)
    }
}

pub struct SnapshotStore {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        Self {
            path,
            tmp_path: PathBuf::from(tmp),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the image atomically: write a temp file, fsync it, rename it over
    /// the live snapshot, then fsync the directory. A crash at any point leaves
    /// either the previous or the new snapshot in place.
    pub async fn save(&self, image: &FsImage) -> DfsResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                DfsError::IoError(format!("create dir {} failed: {}", parent.display(), e))
            })?;
        }

        let data = serde_json::to_vec(image)
            .map_err(|e| DfsError::Internal(format!("encode fsimage failed: {}", e)))?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.tmp_path)
            .await
            .map_err(|e| {
                DfsError::IoError(format!(
                    "open {} failed: {}",
                    self.tmp_path.display(),
                    e
                ))
            })?;
        file.write_all(&data).await.map_err(|e| {
            DfsError::IoError(format!("write {} failed: {}", self.tmp_path.display(), e))
        })?;
        file.flush().await?;
        file.sync_all().await.map_err(|e| {
            DfsError::IoError(format!("sync {} failed: {}", self.tmp_path.display(), e))
        })?;
        drop(file);

        fs::rename(&self.tmp_path, &self.path).await.map_err(|e| {
            DfsError::IoError(format!(
                "rename {} -> {} failed: {}",
                self.tmp_path.display(),
                self.path.display(),
                e
            ))
        })?;
        self.sync_parent_dir().await;

        info!(
            "snapshot saved to {}: last_seq={}, inodes={}, bytes={}",
            self.path.display(),
            image.last_seq,
            image.entries.len() + 1,
            data.len()
        );
        Ok(())
    }

    async fn sync_parent_dir(&self) {
        let Some(parent) = self.path.parent() else {
            return;
        };
        match fs::File::open(parent).await {
            Ok(dir) => {
                if let Err(e) = dir.sync_all().await {
                    warn!("sync snapshot dir {} failed: {}", parent.display(), e);
                }
            }
            Err(e) => warn!("open snapshot dir {} failed: {}", parent.display(), e),
        }
    }

    /// Load the last complete snapshot, `None` on first start.
    pub async fn load(&self) -> DfsResult<Option<FsImage>> {
        if fs::metadata(&self.tmp_path).await.is_ok() {
            warn!(
                "removing leftover snapshot temp file {}",
                self.tmp_path.display()
            );
            if let Err(e) = fs::remove_file(&self.tmp_path).await {
                warn!("remove {} failed: {}", self.tmp_path.display(), e);
            }
        }

        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(DfsError::IoError(format!(
                    "read {} failed: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let image: FsImage = serde_json::from_slice(&raw).map_err(|e| {
            DfsError::Corrupted(format!("snapshot {} is malformed: {}", self.path.display(), e))
        })?;
        Ok(Some(image))
    }
}
