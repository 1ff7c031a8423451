use crate::block_placement::{DEFAULT_BLOCK_SIZE, DEFAULT_MAX_BLOCKS_PER_FILE};
use crate::journal::JOURNAL_FILE_NAME;
use crate::snapshot::SNAPSHOT_FILE_NAME;
use dfs_lib::{DfsError, DfsResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATA_DIR: &str = "/opt/dfs/var/name_meta";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NameMetaConfig {
    #[serde(alias = "meta_dir", alias = "name_dir")]
    pub data_dir: PathBuf,
    #[serde(alias = "block_size_bytes")]
    pub block_size: u64,
    #[serde(alias = "replicas", alias = "replication_factor")]
    pub replication: usize,
    #[serde(alias = "max_file_blocks")]
    pub max_blocks_per_file: u64,
    #[serde(alias = "checkpoint_threshold", alias = "edit_log_threshold")]
    pub edit_log_size_threshold: usize,
    #[serde(alias = "checkpoint_interval")]
    pub checkpoint_interval_secs: u64,
    #[serde(alias = "checkpoint_poll_interval")]
    pub checkpoint_poll_interval_secs: u64,
    #[serde(alias = "heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
}

impl Default for NameMetaConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            block_size: DEFAULT_BLOCK_SIZE,
            replication: 1,
            max_blocks_per_file: DEFAULT_MAX_BLOCKS_PER_FILE,
            edit_log_size_threshold: 1000,
            checkpoint_interval_secs: 60,
            checkpoint_poll_interval_secs: 5,
            heartbeat_timeout_secs: 30,
        }
    }
}

impl NameMetaConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> DfsResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(DfsError::InvalidParam("data_dir is empty".to_string()));
        }
        if self.block_size == 0 {
            return Err(DfsError::InvalidParam("block_size must be > 0".to_string()));
        }
        if self.replication == 0 {
            return Err(DfsError::InvalidParam(
                "replication must be >= 1".to_string(),
            ));
        }
        if self.max_blocks_per_file == 0 {
            return Err(DfsError::InvalidParam(
                "max_blocks_per_file must be >= 1".to_string(),
            ));
        }
        if self.edit_log_size_threshold == 0 {
            return Err(DfsError::InvalidParam(
                "edit_log_size_threshold must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE_NAME)
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join(JOURNAL_FILE_NAME)
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }

    pub fn checkpoint_poll_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_poll_interval_secs.max(1))
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

pub fn read_json_config<T: DeserializeOwned>(path: &Path) -> DfsResult<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| DfsError::IoError(format!("read {} failed: {}", path.display(), e)))?;
    serde_json::from_str::<T>(&content)
        .map_err(|e| DfsError::InvalidParam(format!("parse {} failed: {}", path.display(), e)))
}
