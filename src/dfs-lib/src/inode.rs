use serde::{Deserialize, Serialize};

pub type InodeId = u64;

pub const ROOT_INODE_ID: InodeId = 1;
pub const ROOT_DIR_NAME: &str = "/";

/// One block of a file and the storage nodes chosen to hold it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAssignment {
    pub block_id: String,
    pub node_addresses: Vec<String>,
}

impl BlockAssignment {
    /// Block ids only depend on the file base name and the block index,
    /// so recomputing a placement yields the same ids.
    pub fn block_id_for(base_name: &str, index: u64) -> String {
        format!("{}-block-{}", base_name, index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    pub id: InodeId,
    pub name: String,
    pub is_dir: bool,
    #[serde(default)]
    pub size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<BlockAssignment>,
    /// unix millis
    pub created_at: u64,
}

impl Inode {
    pub fn new_dir(id: InodeId, name: impl Into<String>, created_at: u64) -> Self {
        Self {
            id,
            name: name.into(),
            is_dir: true,
            size: 0,
            blocks: Vec::new(),
            created_at,
        }
    }

    pub fn new_file(
        id: InodeId,
        name: impl Into<String>,
        size: u64,
        blocks: Vec<BlockAssignment>,
        created_at: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            is_dir: false,
            size,
            blocks,
            created_at,
        }
    }

    pub fn root(created_at: u64) -> Self {
        Self::new_dir(ROOT_INODE_ID, ROOT_DIR_NAME, created_at)
    }
}
