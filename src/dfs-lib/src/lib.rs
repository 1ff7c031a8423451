mod inode;
mod journal_entry;
mod path;
mod storage_node;

pub use inode::*;
pub use journal_entry::*;
pub use path::*;
pub use storage_node::*;

use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DfsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("directory not empty: {0}")]
    NotEmpty(String),
    #[error("no capacity: {0}")]
    NoCapacity(String),
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("invalid param: {0}")]
    InvalidParam(String),
    #[error("corrupted: {0}")]
    Corrupted(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl DfsError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DfsError::NotFound(_))
    }
}

pub type DfsResult<T> = std::result::Result<T, DfsError>;

impl From<std::io::Error> for DfsError {
    fn from(err: std::io::Error) -> Self {
        DfsError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for DfsError {
    fn from(err: serde_json::Error) -> Self {
        DfsError::Corrupted(format!("json: {}", err))
    }
}

/// Wall clock in milliseconds. Only used for timestamps, never for identity.
pub fn unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
